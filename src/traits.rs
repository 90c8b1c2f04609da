use anyhow::Result;

/// Source of zero-crossing captures (timer-capture hardware or a simulator).
#[cfg_attr(test, mockall::automock)]
pub trait ZeroCrossingCapture {
    /// Timer tick latched by the next qualifying crossing interrupt.
    /// Returns Ok(None) when no crossing arrived (missed or not yet due).
    fn next_capture(&mut self) -> Result<Option<u32>>;
}

/// The dimmer timer whose compare/reload value the controller steers.
#[cfg_attr(test, mockall::automock)]
pub trait DimmerTimer {
    /// Period currently programmed (ticks).
    fn period_ticks(&self) -> u32;

    /// Program the period for the next half cycle.
    fn set_period_ticks(&mut self, ticks: u32) -> Result<()>;
}
