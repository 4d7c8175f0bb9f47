//! Tree and driver configuration.
//!
//! Configuration can be built directly or loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `BPTREE_AUTO_TUNE`: derive the order from a block size (default: `true`)
//! - `BPTREE_SIZE`: block size in bytes when auto-tuning, otherwise the order (default: `512`)
//! - `BPTREE_OPERATIONS`: operations run by the `bptree` binary (default: `100000`)
//! - `BPTREE_SEED`: RNG seed for the `bptree` binary (default: `42`)
//!
//! # Invariants
//!
//! - `size` is not validated here; the tree rejects unusable values at construction

/// How the tree chooses its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Derive node capacity from a block size and the entry sizes.
    pub auto_tune: bool,
    /// Block size in bytes if `auto_tune`, otherwise the order itself.
    pub size: usize,
}

impl TreeConfig {
    /// Default block size in bytes.
    pub const DEFAULT_BLOCK_SIZE: usize = 512;

    /// Size nodes to fit `block_size` bytes.
    #[must_use]
    pub const fn auto_tuned(block_size: usize) -> Self {
        Self {
            auto_tune: true,
            size: block_size,
        }
    }

    /// Use `order` for both leaves and internal nodes.
    #[must_use]
    pub const fn fixed_order(order: usize) -> Self {
        Self {
            auto_tune: false,
            size: order,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `BPTREE_AUTO_TUNE` or `BPTREE_SIZE` is set to an
    /// unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let auto_tune = match std::env::var("BPTREE_AUTO_TUNE") {
            Ok(value) => parse_bool("BPTREE_AUTO_TUNE", &value)?,
            Err(_) => true,
        };
        let size = load_number("BPTREE_SIZE", Self::DEFAULT_BLOCK_SIZE)?;
        Ok(Self { auto_tune, size })
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::auto_tuned(Self::DEFAULT_BLOCK_SIZE)
    }
}

/// Settings for the `bptree` workload binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub tree: TreeConfig,
    /// Number of random operations to run.
    pub operations: usize,
    /// Seed for the operation generator.
    pub seed: u64,
}

impl DriverConfig {
    pub const DEFAULT_OPERATIONS: usize = 100_000;
    pub const DEFAULT_SEED: u64 = 42;

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tree: TreeConfig::from_env()?,
            operations: load_number("BPTREE_OPERATIONS", Self::DEFAULT_OPERATIONS)?,
            seed: load_number("BPTREE_SEED", Self::DEFAULT_SEED)?,
        })
    }
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a boolean"),
        }),
    }
}

/// Read a numeric variable, falling back to `default` when unset.
fn load_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a valid number"),
        }),
        Err(_) => Ok(default),
    }
}
