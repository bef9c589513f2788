//! JSON report adapter implementing ReportPort.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::error::KabuwalkError;
use crate::domain::report::{SearchRunReport, WindowReport};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Default)]
pub struct JsonReportAdapter {
    pretty: bool,
}

impl JsonReportAdapter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn write_json<T: Serialize>(&self, value: &T, output_path: &str) -> Result<(), KabuwalkError> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| KabuwalkError::Report {
            reason: e.to_string(),
        })?;

        if let Some(parent) = Path::new(output_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| KabuwalkError::Report {
                reason: format!("failed to create {}: {e}", parent.display()),
            })?;
        }
        fs::write(output_path, json).map_err(|e| KabuwalkError::Report {
            reason: format!("failed to write {output_path}: {e}"),
        })
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &SearchRunReport, output_path: &str) -> Result<(), KabuwalkError> {
        self.write_json(report, output_path)
    }

    fn write_window(&self, report: &WindowReport, output_path: &str) -> Result<(), KabuwalkError> {
        self.write_json(report, output_path)
    }
}
