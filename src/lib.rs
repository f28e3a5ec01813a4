use indicatif::{ProgressBar, ProgressStyle};

pub mod cloud;
pub mod descriptor;
pub mod docker;
pub mod driver;
pub mod endpoints;
pub mod error;
pub mod ports;
pub mod start;
pub mod stop;
pub mod templates;
pub mod tunnel;

pub fn default_spinner() -> ProgressBar {
    let spinner_style = ProgressStyle::with_template("{spinner} {prefix:.bold.dim} {wide_msg}")
        .unwrap()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

    let progress = ProgressBar::new_spinner();
    progress.set_style(spinner_style);
    progress.enable_steady_tick(std::time::Duration::from_millis(50));
    progress
}

/// Fail fast when a required external tool is missing from PATH, before any
/// remote work starts.
pub fn check_binaries(binaries: &[&'static str]) -> error::Result<()> {
    for &binary in binaries {
        if which::which(binary).is_err() {
            return Err(error::FleetError::MissingBinary(binary));
        }
    }
    Ok(())
}
