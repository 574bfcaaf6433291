//! Dashboard metrics
//!
//! Normalized tables produced by one load:
//! - `RegionAggregate` rows from the aggregate statement
//! - `OccupationDetail` rows from the detail statement
//! - `NationalSummary` derived from the region rows

pub mod frames;
pub mod queries;

use crate::error::{MetricsError, Result};
use crate::warehouse::ResultSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// `numerator / denominator`, or 0 when there is nothing to divide by.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAggregate {
    pub region_code: String,
    pub total_subgroup_count: u64,
    pub total_overall_count: u64,
    /// Absent when the warehouse had no salary values for the region.
    pub average_subgroup_salary: Option<f64>,
}

impl RegionAggregate {
    pub fn proportion(&self) -> f64 {
        ratio(self.total_subgroup_count, self.total_overall_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupationDetail {
    pub occupation_description: String,
    pub education_description: String,
    pub subgroup_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NationalSummary {
    pub overall_proportion: f64,
    pub total_subgroup_count: u64,
    pub total_overall_count: u64,
    /// Mean of the per-region salary averages that are present.
    pub mean_subgroup_salary: Option<f64>,
}

impl NationalSummary {
    pub fn from_regions(regions: &[RegionAggregate]) -> Self {
        // Saturates instead of overflowing on absurd warehouse totals.
        let total_subgroup_count = regions
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.total_subgroup_count));
        let total_overall_count = regions
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.total_overall_count));

        let salaries: Vec<f64> = regions
            .iter()
            .filter_map(|r| r.average_subgroup_salary)
            .collect();
        let mean_subgroup_salary = if salaries.is_empty() {
            None
        } else {
            Some(salaries.iter().sum::<f64>() / salaries.len() as f64)
        };

        Self {
            overall_proportion: ratio(total_subgroup_count, total_overall_count),
            total_subgroup_count,
            total_overall_count,
            mean_subgroup_salary,
        }
    }
}

/// Everything one load hands to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub regions: Vec<RegionAggregate>,
    pub occupations: Vec<OccupationDetail>,
    pub summary: NationalSummary,
}

impl MetricsSnapshot {
    pub fn new(regions: Vec<RegionAggregate>, occupations: Vec<OccupationDetail>) -> Self {
        let summary = NationalSummary::from_regions(&regions);
        Self {
            regions,
            occupations,
            summary,
        }
    }

    /// Empty tables and a zero summary. Consumers render this as "no data yet".
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Regions ordered by proportion, highest first. Ties fall back to region code.
    pub fn ranked_by_proportion(&self) -> Vec<&RegionAggregate> {
        let mut ranked: Vec<&RegionAggregate> = self.regions.iter().collect();
        ranked.sort_by(|a, b| {
            b.proportion()
                .partial_cmp(&a.proportion())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.region_code.cmp(&b.region_code))
        });
        ranked
    }
}

/// Materialize the aggregate statement's rows.
pub fn regions_from_result(result: &ResultSet) -> Result<Vec<RegionAggregate>> {
    let region_col = result.column_index(queries::REGION_CODE)?;
    let subgroup_col = result.column_index(queries::TOTAL_SUBGROUP)?;
    let overall_col = result.column_index(queries::TOTAL_OVERALL)?;
    let salary_col = result.column_index(queries::AVERAGE_SALARY)?;

    let mut seen = HashSet::new();
    let mut regions = Vec::with_capacity(result.len());

    for row in 0..result.len() {
        let region_code = result.required_text(row, region_col)?.to_string();
        if !seen.insert(region_code.clone()) {
            return Err(MetricsError::MalformedResult(format!(
                "region '{}' appears more than once",
                region_code
            )));
        }

        regions.push(RegionAggregate {
            region_code,
            total_subgroup_count: result.count(row, subgroup_col)?,
            total_overall_count: result.count(row, overall_col)?,
            average_subgroup_salary: result.decimal(row, salary_col)?,
        });
    }

    Ok(regions)
}

/// Materialize the detail statement's rows.
///
/// Re-applies the statement's contract: positive counts only, largest first,
/// at most `TOP_OCCUPATIONS` rows.
pub fn occupations_from_result(result: &ResultSet) -> Result<Vec<OccupationDetail>> {
    let occupation_col = result.column_index(queries::OCCUPATION)?;
    let education_col = result.column_index(queries::EDUCATION)?;
    let count_col = result.column_index(queries::SUBGROUP_COUNT)?;

    let mut occupations = Vec::with_capacity(result.len());
    for row in 0..result.len() {
        let subgroup_count = result.count(row, count_col)?;
        if subgroup_count == 0 {
            debug!(row, "Dropping occupation row without subgroup links");
            continue;
        }
        occupations.push(OccupationDetail {
            occupation_description: result.required_text(row, occupation_col)?.to_string(),
            education_description: result.required_text(row, education_col)?.to_string(),
            subgroup_count,
        });
    }

    occupations.sort_by(|a, b| b.subgroup_count.cmp(&a.subgroup_count));
    occupations.truncate(queries::TOP_OCCUPATIONS);
    Ok(occupations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(code: &str, subgroup: u64, overall: u64, salary: Option<f64>) -> RegionAggregate {
        RegionAggregate {
            region_code: code.to_string(),
            total_subgroup_count: subgroup,
            total_overall_count: overall,
            average_subgroup_salary: salary,
        }
    }

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn test_two_region_scenario() {
        let snapshot = MetricsSnapshot::new(
            vec![
                region("SP", 100, 10_000, Some(2500.0)),
                region("RJ", 50, 5_000, Some(2100.0)),
            ],
            Vec::new(),
        );

        assert_eq!(snapshot.summary.overall_proportion, 0.01);
        assert_eq!(snapshot.summary.total_subgroup_count, 150);
        assert_eq!(snapshot.summary.total_overall_count, 15_000);
        assert_eq!(snapshot.summary.mean_subgroup_salary, Some(2300.0));
        for r in &snapshot.regions {
            assert_eq!(r.proportion(), 0.01);
        }
    }

    #[test]
    fn test_zero_totals_give_zero_proportions() {
        let regions = vec![region("AC", 0, 0, None), region("AP", 7, 0, None)];
        let summary = NationalSummary::from_regions(&regions);

        assert_eq!(summary.overall_proportion, 0.0);
        assert_eq!(summary.mean_subgroup_salary, None);
        assert!(regions.iter().all(|r| r.proportion() == 0.0));
    }

    #[test]
    fn test_overall_proportion_is_ratio_of_sums() {
        let regions = vec![
            region("BA", 3, 7, None),
            region("PE", 11, 0, None),
            region("CE", 5, 13, Some(1500.0)),
        ];
        let summary = NationalSummary::from_regions(&regions);
        assert_eq!(summary.overall_proportion, 19.0 / 20.0);
        assert_eq!(summary.mean_subgroup_salary, Some(1500.0));
    }

    #[test]
    fn test_huge_totals_saturate() {
        let regions = vec![region("SP", u64::MAX, u64::MAX, None), region("RJ", 1, 1, None)];
        let summary = NationalSummary::from_regions(&regions);
        assert_eq!(summary.total_subgroup_count, u64::MAX);
        assert_eq!(summary.total_overall_count, u64::MAX);
        assert_eq!(summary.overall_proportion, 1.0);
    }

    #[test]
    fn test_not_ready_snapshot() {
        let snapshot = MetricsSnapshot::not_ready();
        assert!(!snapshot.is_ready());
        assert!(snapshot.occupations.is_empty());
        assert_eq!(snapshot.summary.overall_proportion, 0.0);
    }

    #[test]
    fn test_ranking_by_proportion() {
        let snapshot = MetricsSnapshot::new(
            vec![
                region("MG", 1, 100, None),
                region("SP", 5, 100, None),
                region("RS", 1, 100, None),
                region("AM", 0, 0, None),
            ],
            Vec::new(),
        );
        let codes: Vec<&str> = snapshot
            .ranked_by_proportion()
            .iter()
            .map(|r| r.region_code.as_str())
            .collect();
        assert_eq!(codes, vec!["SP", "MG", "RS", "AM"]);
    }

    #[test]
    fn test_regions_from_result() {
        let result = ResultSet::new(
            vec![
                "sigla_uf".to_string(),
                "total_tea".to_string(),
                "total_geral".to_string(),
                "media_salarial_tea".to_string(),
            ],
            vec![
                cells(&["SP", "100", "10000", "2500.5"]),
                vec![Some("RJ".to_string()), Some("50".to_string()), Some("5000".to_string()), None],
            ],
        );

        let regions = regions_from_result(&result).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], region("SP", 100, 10_000, Some(2500.5)));
        assert_eq!(regions[1], region("RJ", 50, 5_000, None));
    }

    #[test]
    fn test_duplicate_region_is_malformed() {
        let result = ResultSet::new(
            vec![
                "sigla_uf".to_string(),
                "total_tea".to_string(),
                "total_geral".to_string(),
                "media_salarial_tea".to_string(),
            ],
            vec![cells(&["SP", "1", "2", "3"]), cells(&["SP", "1", "2", "3"])],
        );
        assert!(matches!(
            regions_from_result(&result),
            Err(MetricsError::MalformedResult(_))
        ));
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let result = ResultSet::new(vec!["sigla_uf".to_string()], vec![cells(&["SP"])]);
        assert!(matches!(
            regions_from_result(&result),
            Err(MetricsError::MalformedResult(_))
        ));
    }

    #[test]
    fn test_occupations_keep_query_contract() {
        let mut rows = Vec::new();
        for n in 0..14u64 {
            let name = format!("occupation {}", n);
            let count = n.to_string();
            rows.push(cells(&[name.as_str(), "Superior completo", count.as_str()]));
        }
        let result = ResultSet::new(
            vec![
                "ocupacao_descricao".to_string(),
                "instrucao_descricao".to_string(),
                "total_vinculos_pcd_tea".to_string(),
            ],
            rows,
        );

        let occupations = occupations_from_result(&result).unwrap();
        assert_eq!(occupations.len(), 10);
        assert!(occupations.iter().all(|o| o.subgroup_count > 0));
        assert!(occupations
            .windows(2)
            .all(|w| w[0].subgroup_count >= w[1].subgroup_count));
        assert_eq!(occupations[0].occupation_description, "occupation 13");
    }

    #[test]
    fn test_null_occupation_label_is_malformed() {
        let result = ResultSet::new(
            vec![
                "ocupacao_descricao".to_string(),
                "instrucao_descricao".to_string(),
                "total_vinculos_pcd_tea".to_string(),
            ],
            vec![
                cells(&["Auxiliar de escritorio", "Medio completo", "40"]),
                vec![Some("Repositor".to_string()), None, Some("25".to_string())],
            ],
        );
        match occupations_from_result(&result) {
            Err(MetricsError::MalformedResult(msg)) => assert!(msg.contains("instrucao_descricao")),
            other => panic!("expected malformed result, got {:?}", other),
        }
    }
}
