// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Glitch run collaborators
//!
//! [`Capture`] acquires analog samples around the glitch, and [`Indicator`]
//! shows run progress.  `()` implements both as no-ops.

/// Analog acquisition hooks called by [`crate::Glitcher`].
pub trait Capture {
    /// Sets the number of samples acquired by [`Self::run_capture()`].  The
    /// count has already been validated.
    fn configure(&mut self, sample_count: u32);

    /// Called once the lane is armed, before the trigger.  Must not block.
    fn prepare_capture(&mut self);

    /// Called once triggered.  Blocks until acquisition completes.
    fn run_capture(&mut self);

    /// Samples from the most recent capture.
    fn samples(&self) -> &[u8];
}

impl Capture for () {
    fn configure(&mut self, _sample_count: u32) {}
    fn prepare_capture(&mut self) {}
    fn run_capture(&mut self) {}
    fn samples(&self) -> &[u8] {
        &[]
    }
}

/// Status indicators, typically LEDs.
pub trait Indicator {
    /// Lit while armed.
    fn set_ready(&mut self, on: bool);

    /// Lit from trigger detection until teardown.
    fn set_triggered(&mut self, on: bool);
}

impl Indicator for () {
    fn set_ready(&mut self, _on: bool) {}
    fn set_triggered(&mut self, _on: bool) {}
}
