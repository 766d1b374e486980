use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    UInt64,
    Byte,
    Int16,
    Float,
    String,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::UInt64 => "uint64",
            ValueKind::Byte => "byte",
            ValueKind::Int16 => "int16",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list<int16>",
        };
        f.write_str(name)
    }
}

/// A configuration value as exchanged with the driver framework.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    UInt64(u64),
    Byte(u8),
    Int16(i16),
    Float(f64),
    String(String),
    List(Vec<i16>),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::UInt64(_) => ValueKind::UInt64,
            ConfigValue::Byte(_) => ValueKind::Byte,
            ConfigValue::Int16(_) => ValueKind::Int16,
            ConfigValue::Float(_) => ValueKind::Float,
            ConfigValue::String(_) => ValueKind::String,
            ConfigValue::List(_) => ValueKind::List,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u64> for ConfigValue {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<u8> for ConfigValue {
    fn from(v: u8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for ConfigValue {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Samplerate,
    LimitSamples,
    DeviceMode,
    PatternMode,
    Instant,
    Timebase,
    TriggerEnable,
    TriggerMask,
    TriggerValue,
    TriggerEdge,
    HorizTriggerPos,
    TriggerHoldoff,
    TriggerMargin,
    ProbeEnable,
    ProbeVdiv,
    ProbeFactor,
    ProbeOffset,
    ProbeHwOffset,
    ProbeCoupling,
    ProbeTriggerValue,
    ProbeMapDefault,
    ProbeMapUnit,
    ProbeMapMin,
    ProbeMapMax,
    MaxTimebase,
    MinTimebase,
    SamplerateMin,
    SamplerateMax,
}

const KEY_NAMES: [(ConfigKey, &str); 28] = [
    (ConfigKey::Samplerate, "samplerate"),
    (ConfigKey::LimitSamples, "limit_samples"),
    (ConfigKey::DeviceMode, "device_mode"),
    (ConfigKey::PatternMode, "pattern_mode"),
    (ConfigKey::Instant, "instant"),
    (ConfigKey::Timebase, "timebase"),
    (ConfigKey::TriggerEnable, "trigger_enable"),
    (ConfigKey::TriggerMask, "trigger_mask"),
    (ConfigKey::TriggerValue, "trigger_value"),
    (ConfigKey::TriggerEdge, "trigger_edge"),
    (ConfigKey::HorizTriggerPos, "horiz_triggerpos"),
    (ConfigKey::TriggerHoldoff, "trigger_holdoff"),
    (ConfigKey::TriggerMargin, "trigger_margin"),
    (ConfigKey::ProbeEnable, "probe_en"),
    (ConfigKey::ProbeVdiv, "probe_vdiv"),
    (ConfigKey::ProbeFactor, "probe_factor"),
    (ConfigKey::ProbeOffset, "probe_offset"),
    (ConfigKey::ProbeHwOffset, "probe_hw_offset"),
    (ConfigKey::ProbeCoupling, "probe_coupling"),
    (ConfigKey::ProbeTriggerValue, "probe_trig_value"),
    (ConfigKey::ProbeMapDefault, "probe_map_default"),
    (ConfigKey::ProbeMapUnit, "probe_map_unit"),
    (ConfigKey::ProbeMapMin, "probe_map_min"),
    (ConfigKey::ProbeMapMax, "probe_map_max"),
    (ConfigKey::MaxTimebase, "max_timebase"),
    (ConfigKey::MinTimebase, "min_timebase"),
    (ConfigKey::SamplerateMin, "samplerate_min"),
    (ConfigKey::SamplerateMax, "samplerate_max"),
];

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        KEY_NAMES
            .iter()
            .find(|(key, _)| key == self)
            .map_or("unknown", |(_, name)| name)
    }

    /// Keys addressing a single channel.
    pub fn is_channel_key(&self) -> bool {
        matches!(
            self,
            ConfigKey::ProbeEnable
                | ConfigKey::ProbeVdiv
                | ConfigKey::ProbeFactor
                | ConfigKey::ProbeOffset
                | ConfigKey::ProbeHwOffset
                | ConfigKey::ProbeCoupling
                | ConfigKey::ProbeTriggerValue
                | ConfigKey::ProbeMapDefault
                | ConfigKey::ProbeMapUnit
                | ConfigKey::ProbeMapMin
                | ConfigKey::ProbeMapMax
        )
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ConfigKey::ProbeHwOffset
                | ConfigKey::MaxTimebase
                | ConfigKey::MinTimebase
                | ConfigKey::SamplerateMin
                | ConfigKey::SamplerateMax
        )
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KEY_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(key, _)| *key)
            .ok_or_else(|| ConfigError::NotApplicable { key: s.to_string() })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Configuration key '{key}' is not applicable")]
    NotApplicable { key: String },

    #[error("Configuration is only possible while no acquisition is running")]
    InvalidState,

    #[error("Key '{key}' expects a {expected} value, got {found}")]
    TypeMismatch {
        key: ConfigKey,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: ConfigKey, reason: String },

    #[error("Channel {index} does not exist in the current mode")]
    NoSuchChannel { index: u16 },

    #[error("Key '{0}' needs a channel")]
    MissingChannel(ConfigKey),
}

impl ConfigError {
    pub(crate) fn invalid(key: ConfigKey, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

/// Typed extraction of a configuration value for a given key.
pub(crate) trait Extract: Sized {
    const KIND: ValueKind;
    fn extract(value: ConfigValue) -> Option<Self>;

    fn from_config(key: ConfigKey, value: ConfigValue) -> Result<Self, ConfigError> {
        let found = value.kind();
        Self::extract(value).ok_or(ConfigError::TypeMismatch {
            key,
            expected: Self::KIND,
            found,
        })
    }
}

macro_rules! impl_extract {
    ($ty:ty, $variant:ident) => {
        impl Extract for $ty {
            const KIND: ValueKind = ValueKind::$variant;
            fn extract(value: ConfigValue) -> Option<Self> {
                match value {
                    ConfigValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_extract!(bool, Bool);
impl_extract!(u64, UInt64);
impl_extract!(u8, Byte);
impl_extract!(i16, Int16);
impl_extract!(f64, Float);
impl_extract!(String, String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for (key, name) in KEY_NAMES {
            assert_eq!(name.parse::<ConfigKey>().unwrap(), key);
            assert_eq!(key.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_key_is_not_applicable() {
        assert_eq!(
            "max_height".parse::<ConfigKey>(),
            Err(ConfigError::NotApplicable {
                key: "max_height".to_string()
            })
        );
    }

    #[test]
    fn test_extract_type_mismatch() {
        assert_eq!(
            u64::from_config(ConfigKey::Samplerate, ConfigValue::UInt64(5)),
            Ok(5)
        );
        assert_eq!(
            u64::from_config(ConfigKey::Samplerate, ConfigValue::Bool(true)),
            Err(ConfigError::TypeMismatch {
                key: ConfigKey::Samplerate,
                expected: ValueKind::UInt64,
                found: ValueKind::Bool,
            })
        );
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(ConfigValue::from(3u8).kind(), ValueKind::Byte);
        assert_eq!(ConfigValue::List(vec![1, 2]).kind(), ValueKind::List);
        assert_eq!(ConfigValue::from("Sine").kind(), ValueKind::String);
    }
}
