use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat, FileSourceFile, Map, Source, Value, ValueKind};

use crate::error::ConfigError;

/// Build a file source whose format follows the file extension (`.yaml`/`.yml`
/// are YAML, everything else TOML).
pub fn config_source(path: &Path) -> File<FileSourceFile, FileFormat> {
    File::from(path).format(file_format(path))
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        _ => FileFormat::Toml,
    }
}

/// Load a single TOML or YAML file.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    Config::builder()
        .add_source(config_source(path))
        .build()
        .map_err(|source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        })
}

/// A module property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl ConfigValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "string",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Conversion from a property value into a typed Rust value.
///
/// Strings never coerce into integers or booleans and vice versa; an integer
/// that does not fit the requested width is a type mismatch.
pub trait FromConfigValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromConfigValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

macro_rules! integer_from_config_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromConfigValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_config_value(value: &ConfigValue) -> Option<Self> {
                    match value {
                        ConfigValue::Integer(i) => <$ty>::try_from(*i).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

integer_from_config_value! {
    i64 => "integer",
    u16 => "integer in 0..=65535",
    u32 => "non-negative 32-bit integer",
    u64 => "non-negative integer",
}

/// Flat, dotted-key view of the properties a descriptor hands to its module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, mostly useful in tests.
    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up an optional property. Absent yields `Ok(None)`, a value of the
    /// wrong type yields [`ConfigError::TypeMismatch`].
    pub fn get<T: FromConfigValue>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        T::from_config_value(value)
            .map(Some)
            .ok_or_else(|| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: T::TYPE_NAME,
                found: value.type_name(),
            })
    }

    /// Like [`ModuleConfig::get`] but substitutes `default` when the key is absent.
    pub fn get_or<T: FromConfigValue>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Look up a property that must be present.
    pub fn require<T: FromConfigValue>(&self, key: &str) -> Result<T, ConfigError> {
        self.get(key)?.ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }
}

/// One module instance as declared by a descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// File stem of the descriptor, e.g. `uptime` for `uptime.toml`.
    pub instance: String,
    /// Registered module name to instantiate.
    pub module: String,
    pub enabled: bool,
    pub config: ModuleConfig,
    pub source: PathBuf,
}

impl ModuleDescriptor {
    pub fn new(instance: impl Into<String>, module: impl Into<String>, config: ModuleConfig) -> Self {
        Self {
            instance: instance.into(),
            module: module.into(),
            enabled: true,
            config,
            source: PathBuf::new(),
        }
    }

    /// Read a descriptor file. The reserved `module` key names the module,
    /// `enabled` switches it off, every other key becomes a module property.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let instance = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        let table = load_config_file(path)?
            .collect()
            .map_err(|source| ConfigError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        let mut values = BTreeMap::new();
        flatten("", table, &mut values)?;

        let module = match values.remove("module") {
            Some(ConfigValue::String(module)) => module,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: "module".to_string(),
                    expected: "string",
                    found: other.type_name(),
                })
            }
            None => {
                return Err(ConfigError::Missing {
                    key: "module".to_string(),
                })
            }
        };
        let enabled = match values.remove("enabled") {
            Some(ConfigValue::Boolean(enabled)) => enabled,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: "enabled".to_string(),
                    expected: "boolean",
                    found: other.type_name(),
                })
            }
            None => true,
        };

        Ok(Self {
            instance,
            module,
            enabled,
            config: ModuleConfig { values },
            source: path.to_path_buf(),
        })
    }
}

fn flatten(
    prefix: &str,
    table: Map<String, Value>,
    out: &mut BTreeMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        let unsupported = |found: &'static str, key: String| ConfigError::UnsupportedValue { key, found };
        let value = match value.kind {
            ValueKind::String(s) => ConfigValue::String(s),
            ValueKind::Boolean(b) => ConfigValue::Boolean(b),
            ValueKind::I64(i) => ConfigValue::Integer(i),
            ValueKind::U64(u) => match i64::try_from(u) {
                Ok(i) => ConfigValue::Integer(i),
                Err(_) => return Err(unsupported("out-of-range integer", key)),
            },
            ValueKind::I128(i) => match i64::try_from(i) {
                Ok(i) => ConfigValue::Integer(i),
                Err(_) => return Err(unsupported("out-of-range integer", key)),
            },
            ValueKind::U128(u) => match i64::try_from(u) {
                Ok(i) => ConfigValue::Integer(i),
                Err(_) => return Err(unsupported("out-of-range integer", key)),
            },
            ValueKind::Table(nested) => {
                flatten(&key, nested, out)?;
                continue;
            }
            ValueKind::Float(_) => return Err(unsupported("float", key)),
            ValueKind::Array(_) => return Err(unsupported("array", key)),
            ValueKind::Nil => return Err(unsupported("empty", key)),
        };
        out.insert(key, value);
    }
    Ok(())
}

fn is_descriptor(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("toml") | Some("yaml") | Some("yml")
        )
}

/// Load every descriptor in `dir`, sorted by file name. Files with other
/// extensions are ignored.
pub fn load_descriptors(dir: &Path) -> Result<Vec<ModuleDescriptor>, ConfigError> {
    let read_dir = |source| ConfigError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir)? {
        let path = entry.map_err(read_dir)?.path();
        if is_descriptor(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|path| ModuleDescriptor::from_file(path)).collect()
}
