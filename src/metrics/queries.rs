//! The two statements the dashboard runs against the gold table.

use crate::config::TableRef;

pub const REGION_CODE: &str = "sigla_uf";
pub const SUBGROUP_COUNT: &str = "total_vinculos_pcd_tea";
pub const OVERALL_COUNT: &str = "total_vinculos_geral";
pub const SUBGROUP_SALARY: &str = "media_salarial_pcd_tea";
pub const OCCUPATION: &str = "ocupacao_descricao";
pub const EDUCATION: &str = "instrucao_descricao";

// Aliases produced by the aggregate statement
pub const TOTAL_SUBGROUP: &str = "total_tea";
pub const TOTAL_OVERALL: &str = "total_geral";
pub const AVERAGE_SALARY: &str = "media_salarial_tea";

/// Maximum number of occupation rows the detail statement returns.
pub const TOP_OCCUPATIONS: usize = 10;

/// Per-region sums and salary average over the whole table.
pub fn region_aggregate(table: &TableRef) -> String {
    format!(
        "SELECT {region}, SUM({subgroup}) AS {total_subgroup}, SUM({overall}) AS {total_overall}, \
         AVG({salary}) AS {average_salary} FROM {table} GROUP BY {region}",
        region = REGION_CODE,
        subgroup = SUBGROUP_COUNT,
        total_subgroup = TOTAL_SUBGROUP,
        overall = OVERALL_COUNT,
        total_overall = TOTAL_OVERALL,
        salary = SUBGROUP_SALARY,
        average_salary = AVERAGE_SALARY,
        table = table,
    )
}

/// Top occupations by subgroup count, largest first.
pub fn occupation_detail(table: &TableRef) -> String {
    format!(
        "SELECT {occupation}, {education}, {subgroup} FROM {table} \
         WHERE {subgroup} > 0 ORDER BY {subgroup} DESC LIMIT {limit}",
        occupation = OCCUPATION,
        education = EDUCATION,
        subgroup = SUBGROUP_COUNT,
        table = table,
        limit = TOP_OCCUPATIONS,
    )
}
