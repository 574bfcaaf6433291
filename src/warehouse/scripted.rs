//! In-process warehouse for unit tests. Answers by statement shape and counts
//! connects, statements and closes.

use crate::config::ConnectionConfig;
use crate::error::{MetricsError, Result};
use crate::warehouse::{ResultSet, Warehouse, WarehouseConnection};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct Calls {
    pub connects: usize,
    pub closes: usize,
    pub statements: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedWarehouse {
    pub regions: ResultSet,
    pub occupations: ResultSet,
    /// Fail the connect handshake with this message.
    pub connect_error: Option<String>,
    /// Fail any statement whose text contains this marker.
    pub fail_statement_containing: Option<String>,
    pub calls: Arc<Mutex<Calls>>,
}

impl ScriptedWarehouse {
    pub fn with_results(regions: ResultSet, occupations: ResultSet) -> Self {
        Self {
            regions,
            occupations,
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.calls.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.calls.lock().unwrap().closes
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls.lock().unwrap().statements.clone()
    }
}

pub fn region_rows(rows: &[(&str, &str, &str, Option<&str>)]) -> ResultSet {
    ResultSet::new(
        vec![
            "sigla_uf".to_string(),
            "total_tea".to_string(),
            "total_geral".to_string(),
            "media_salarial_tea".to_string(),
        ],
        rows.iter()
            .map(|(code, subgroup, overall, salary)| {
                vec![
                    Some(code.to_string()),
                    Some(subgroup.to_string()),
                    Some(overall.to_string()),
                    salary.map(|s| s.to_string()),
                ]
            })
            .collect(),
    )
}

pub fn occupation_rows(rows: &[(&str, &str, &str)]) -> ResultSet {
    ResultSet::new(
        vec![
            "ocupacao_descricao".to_string(),
            "instrucao_descricao".to_string(),
            "total_vinculos_pcd_tea".to_string(),
        ],
        rows.iter()
            .map(|(occupation, education, count)| {
                vec![
                    Some(occupation.to_string()),
                    Some(education.to_string()),
                    Some(count.to_string()),
                ]
            })
            .collect(),
    )
}

#[async_trait]
impl Warehouse for ScriptedWarehouse {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn WarehouseConnection>> {
        self.calls.lock().unwrap().connects += 1;
        if let Some(message) = &self.connect_error {
            return Err(MetricsError::Connection(message.clone()));
        }
        Ok(Box::new(ScriptedConnection {
            script: self.clone(),
        }))
    }
}

struct ScriptedConnection {
    script: ScriptedWarehouse,
}

#[async_trait]
impl WarehouseConnection for ScriptedConnection {
    async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        self.script.calls.lock().unwrap().statements.push(sql.to_string());
        if let Some(marker) = &self.script.fail_statement_containing {
            if sql.contains(marker.as_str()) {
                return Err(MetricsError::Statement(format!("scripted failure for '{}'", marker)));
            }
        }
        if sql.contains("GROUP BY") {
            Ok(self.script.regions.clone())
        } else {
            Ok(self.script.occupations.clone())
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.script.calls.lock().unwrap().closes += 1;
        Ok(())
    }
}
