//! Report generation port.

use crate::domain::error::KabuwalkError;
use crate::domain::report::{SearchRunReport, WindowReport};

/// Port for writing run artifacts.
pub trait ReportPort {
    fn write(&self, report: &SearchRunReport, output_path: &str) -> Result<(), KabuwalkError>;

    /// Single-window result of a fixed-parameter backtest.
    fn write_window(&self, report: &WindowReport, output_path: &str) -> Result<(), KabuwalkError>;
}
