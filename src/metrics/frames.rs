//! DataFrame views of a snapshot for presentation consumers.

use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use polars::prelude::*;

impl MetricsSnapshot {
    /// One row per region with its proportion, ranked highest first.
    pub fn regions_frame(&self) -> Result<DataFrame> {
        let ranked = self.ranked_by_proportion();

        let codes: Vec<&str> = ranked.iter().map(|r| r.region_code.as_str()).collect();
        let subgroup: Vec<u64> = ranked.iter().map(|r| r.total_subgroup_count).collect();
        let overall: Vec<u64> = ranked.iter().map(|r| r.total_overall_count).collect();
        let salary: Vec<Option<f64>> = ranked.iter().map(|r| r.average_subgroup_salary).collect();
        let proportion: Vec<f64> = ranked.iter().map(|r| r.proportion()).collect();

        let df = DataFrame::new(vec![
            Series::new("region_code", codes),
            Series::new("total_subgroup_count", subgroup),
            Series::new("total_overall_count", overall),
            Series::new("average_subgroup_salary", salary),
            Series::new("proportion", proportion),
        ])?;
        Ok(df)
    }

    /// Top occupations in load order (largest subgroup count first).
    pub fn occupations_frame(&self) -> Result<DataFrame> {
        let occupation: Vec<&str> = self
            .occupations
            .iter()
            .map(|o| o.occupation_description.as_str())
            .collect();
        let education: Vec<&str> = self
            .occupations
            .iter()
            .map(|o| o.education_description.as_str())
            .collect();
        let count: Vec<u64> = self.occupations.iter().map(|o| o.subgroup_count).collect();

        let df = DataFrame::new(vec![
            Series::new("occupation_description", occupation),
            Series::new("education_description", education),
            Series::new("subgroup_count", count),
        ])?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::{MetricsSnapshot, OccupationDetail, RegionAggregate};

    #[test]
    fn test_regions_frame_is_ranked() {
        let snapshot = MetricsSnapshot::new(
            vec![
                RegionAggregate {
                    region_code: "RJ".to_string(),
                    total_subgroup_count: 10,
                    total_overall_count: 1_000,
                    average_subgroup_salary: None,
                },
                RegionAggregate {
                    region_code: "SP".to_string(),
                    total_subgroup_count: 30,
                    total_overall_count: 1_000,
                    average_subgroup_salary: Some(2000.0),
                },
            ],
            Vec::new(),
        );

        let df = snapshot.regions_frame().unwrap();
        assert_eq!(df.shape(), (2, 5));
        let codes = df.column("region_code").unwrap();
        assert_eq!(codes.str().unwrap().get(0), Some("SP"));
        let proportion = df.column("proportion").unwrap();
        assert_eq!(proportion.f64().unwrap().get(0), Some(0.03));
    }

    #[test]
    fn test_empty_snapshot_frames() {
        let snapshot = MetricsSnapshot::not_ready();
        assert_eq!(snapshot.regions_frame().unwrap().height(), 0);
        assert_eq!(snapshot.occupations_frame().unwrap().height(), 0);
    }

    #[test]
    fn test_occupations_frame_columns() {
        let snapshot = MetricsSnapshot::new(
            Vec::new(),
            vec![OccupationDetail {
                occupation_description: "Auxiliar de escritorio".to_string(),
                education_description: "Medio completo".to_string(),
                subgroup_count: 42,
            }],
        );
        let df = snapshot.occupations_frame().unwrap();
        assert_eq!(df.shape(), (1, 3));
        assert_eq!(df.column("subgroup_count").unwrap().u64().unwrap().get(0), Some(42));
    }
}
