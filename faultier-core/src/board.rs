// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Faultier board line assignments.
//!
//! Every logical trigger source and output maps to exactly one GPIO here.
//! Nothing else in faultier hard codes a glitch or trigger GPIO number.
//!
//! The two external connectors can be used either as a trigger input or as
//! an output, so `Ext0` and `Ext1` appear in both tables with the same GPIO.

use crate::glitch::{GlitchOutput, TriggerSource};

/// GPIO used by each trigger source.
pub const TRIGGER_LINES: [(TriggerSource, u8); 2] =
    [(TriggerSource::Ext0, 9), (TriggerSource::Ext1, 8)];

/// GPIO used by each output.  [`GlitchOutput::None`] has no line.
pub const OUTPUT_LINES: [(GlitchOutput, u8); 6] = [
    (GlitchOutput::Ext0, 9),
    (GlitchOutput::Ext1, 8),
    (GlitchOutput::Crowbar, 17),
    (GlitchOutput::Mux0, 20),
    (GlitchOutput::Mux1, 21),
    (GlitchOutput::Mux2, 22),
];

/// "Ready" LED, lit while the glitcher is armed.
pub const LED_READY: u8 = 14;

/// "Triggered" LED, lit from trigger detection until teardown.
pub const LED_TRIGGERED: u8 = 15;

/// Analog capture input (ADC0).
pub const ADC_INPUT: u8 = 26;

/// Command link UART0 TX/RX.
pub const UART_TX: u8 = 0;
pub const UART_RX: u8 = 1;

/// Returns the GPIO carrying `source`.
pub fn trigger_line(source: TriggerSource) -> u8 {
    TRIGGER_LINES
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, gpio)| *gpio)
        .unwrap_or(TRIGGER_LINES[1].1)
}

/// Returns the GPIO for `output`, or `None` for [`GlitchOutput::None`].
pub fn output_line(output: GlitchOutput) -> Option<u8> {
    OUTPUT_LINES
        .iter()
        .find(|(o, _)| *o == output)
        .map(|(_, gpio)| *gpio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_source_has_a_line() {
        for source in TriggerSource::iter() {
            assert!(TRIGGER_LINES.iter().any(|(s, _)| *s == source));
        }
    }

    #[test]
    fn every_output_except_none_has_a_line() {
        for output in GlitchOutput::iter() {
            assert_eq!(output_line(output).is_none(), output.is_none(), "{output}");
        }
    }

    #[test]
    fn connectors_share_lines() {
        assert_eq!(
            Some(trigger_line(TriggerSource::Ext0)),
            output_line(GlitchOutput::Ext0)
        );
        assert_eq!(
            Some(trigger_line(TriggerSource::Ext1)),
            output_line(GlitchOutput::Ext1)
        );
    }

    #[test]
    fn lines_are_distinct() {
        let mut seen = [false; 30];
        let outputs = OUTPUT_LINES.iter().map(|(_, gpio)| *gpio);
        let others = [LED_READY, LED_TRIGGERED, ADC_INPUT, UART_TX, UART_RX];
        for gpio in outputs.chain(others) {
            assert!(!seen[gpio as usize], "GPIO {gpio} used twice");
            seen[gpio as usize] = true;
        }
    }
}
