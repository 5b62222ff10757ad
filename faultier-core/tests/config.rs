// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use faultier_core::{
    ConfigError, GlitchConfiguration, GlitchOutput, GlitcherSettings, MAX_ADC_SAMPLES,
    TriggerPull, TriggerSource, TriggerType,
};

#[test]
fn default_configuration() {
    let config = GlitchConfiguration::default();
    assert_eq!(config.trigger_type, TriggerType::None);
    assert_eq!(config.trigger_source, TriggerSource::Ext1);
    assert_eq!(config.trigger_pull, TriggerPull::None);
    assert_eq!(config.glitch_output, GlitchOutput::Ext0);
    assert!(!config.has_power_cycle());
    assert!(config.has_glitch_output());
}

#[test]
fn sample_count_over_maximum_is_rejected() {
    let mut config = GlitchConfiguration::default();
    config.set_adc_sample_count(1200).unwrap();

    let err = config.set_adc_sample_count(MAX_ADC_SAMPLES + 1).unwrap_err();
    assert_eq!(err, ConfigError::SampleCount(30001));
    assert_eq!(config.adc_sample_count, 1200);

    config.set_adc_sample_count(MAX_ADC_SAMPLES).unwrap();
    assert_eq!(config.adc_sample_count, 30000);
}

#[test]
fn applying_settings_keeps_sample_count() {
    let mut config = GlitchConfiguration::default();
    config.set_adc_sample_count(500).unwrap();

    let settings = GlitcherSettings {
        trigger_type: TriggerType::RisingEdge,
        trigger_pull: TriggerPull::PullDown,
        glitch_output: GlitchOutput::Crowbar,
        delay_cycles: 1000,
        pulse_width_cycles: 100,
        ..Default::default()
    };
    config.apply_settings(&settings);

    assert_eq!(config.trigger_type, TriggerType::RisingEdge);
    assert_eq!(config.glitch_output, GlitchOutput::Crowbar);
    assert_eq!(config.delay_cycles, 1000);
    assert_eq!(config.pulse_width_cycles, 100);
    assert_eq!(config.adc_sample_count, 500);
}

#[test]
fn unknown_trigger_value_is_preserved() {
    let settings: GlitcherSettings =
        serde_json::from_str(r#"{"trigger_type":9,"glitch_output":"crowbar"}"#).unwrap();
    assert_eq!(settings.trigger_type, TriggerType::Unsupported(9));
    assert_eq!(settings.glitch_output, GlitchOutput::Crowbar);
    assert_eq!(settings.trigger_source, TriggerSource::Ext1);
    assert_eq!(settings.trigger_timeout_ms, None);
}

#[test]
fn trigger_type_wire_values() {
    for (index, trigger) in TriggerType::SUPPORTED.iter().enumerate() {
        assert_eq!(trigger.to_byte() as usize, index);
        assert_eq!(TriggerType::from(index as u8), *trigger);
    }
    assert_eq!(TriggerType::RisingEdge.to_string(), "rising_edge");
    assert_eq!(TriggerType::Unsupported(42).to_string(), "unsupported(42)");
}

#[test]
fn config_error_display() {
    let err = ConfigError::SampleCount(40000);
    assert_eq!(err.to_string(), "Sample count exceeds maximum: 40000 > 30000");
}
