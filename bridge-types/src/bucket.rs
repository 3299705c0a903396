//! Bucket configuration and bucket metadata.
//!
//! Bucket metadata is immutable once the bucket exists and small enough to
//! copy, so it crosses the boundary by value instead of through a handle.

use serde::{Deserialize, Serialize};

use crate::{BridgeError, SnapshotSchema, TypeTag};

/// Default erasure share size in bytes.
pub const DEFAULT_SHARE_SIZE: u32 = 256;
/// Default minimum shares needed to rebuild a segment.
pub const DEFAULT_REQUIRED_SHARES: u16 = 29;
/// Default share count below which repair starts.
pub const DEFAULT_REPAIR_SHARES: u16 = 35;
/// Default share count at which an upload is considered successful.
pub const DEFAULT_OPTIMAL_SHARES: u16 = 80;
/// Default number of shares generated.
pub const DEFAULT_TOTAL_SHARES: u16 = 130;
/// Default segment size in bytes (64 MiB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Encryption cipher suite.
///
/// Encoded as its protobuf enum number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CipherSuite {
    /// Not set; replaced by the default.
    #[default]
    Unspecified,
    /// No encryption.
    Null,
    /// AES-256-GCM.
    AesGcm,
    /// NaCl secretbox.
    SecretBox,
}

/// Erasure coding algorithm.
///
/// Encoded as its protobuf enum number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RedundancyAlgorithm {
    /// Not set; replaced by the default.
    #[default]
    Unspecified,
    /// Reed-Solomon.
    ReedSolomon,
}

impl From<CipherSuite> for u8 {
    fn from(suite: CipherSuite) -> u8 {
        match suite {
            CipherSuite::Unspecified => 0,
            CipherSuite::Null => 1,
            CipherSuite::AesGcm => 2,
            CipherSuite::SecretBox => 3,
        }
    }
}

impl TryFrom<u8> for CipherSuite {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(CipherSuite::Unspecified),
            1 => Ok(CipherSuite::Null),
            2 => Ok(CipherSuite::AesGcm),
            3 => Ok(CipherSuite::SecretBox),
            other => Err(format!("unknown cipher suite {other}")),
        }
    }
}

impl From<RedundancyAlgorithm> for u8 {
    fn from(algorithm: RedundancyAlgorithm) -> u8 {
        match algorithm {
            RedundancyAlgorithm::Unspecified => 0,
            RedundancyAlgorithm::ReedSolomon => 1,
        }
    }
}

impl TryFrom<u8> for RedundancyAlgorithm {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(RedundancyAlgorithm::Unspecified),
            1 => Ok(RedundancyAlgorithm::ReedSolomon),
            other => Err(format!("unknown redundancy algorithm {other}")),
        }
    }
}

/// How object data is encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionParameters {
    /// Cipher used for object data.
    pub cipher_suite: CipherSuite,
    /// Encryption block size in bytes.
    pub block_size: u32,
}

/// How object data is erasure coded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedundancyScheme {
    /// Erasure coding algorithm.
    pub algorithm: RedundancyAlgorithm,
    /// Size of one erasure share in bytes.
    pub share_size: u32,
    /// Shares needed to rebuild a segment.
    pub required_shares: u16,
    /// Repair threshold.
    pub repair_shares: u16,
    /// Success threshold.
    pub optimal_shares: u16,
    /// Shares generated per segment.
    pub total_shares: u16,
}

/// Options for creating a bucket. Zero fields take defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Cipher used for object paths.
    pub path_cipher: CipherSuite,
    /// Object data encryption.
    pub encryption_parameters: EncryptionParameters,
    /// Object data redundancy.
    pub redundancy_scheme: RedundancyScheme,
    /// Maximum segment size in bytes.
    pub segment_size: u64,
}

impl SnapshotSchema for BucketConfig {
    const TAG: TypeTag = TypeTag::BucketConfig;
    const FIELDS: &'static [&'static str] = &[
        "path_cipher",
        "encryption_parameters",
        "encryption_parameters.cipher_suite",
        "encryption_parameters.block_size",
        "redundancy_scheme",
        "redundancy_scheme.algorithm",
        "redundancy_scheme.share_size",
        "redundancy_scheme.required_shares",
        "redundancy_scheme.repair_shares",
        "redundancy_scheme.optimal_shares",
        "redundancy_scheme.total_shares",
        "segment_size",
    ];
}

impl BucketConfig {
    /// Fill every zero-valued field with its default.
    pub fn with_defaults(mut self) -> Self {
        if self.path_cipher == CipherSuite::Unspecified {
            self.path_cipher = CipherSuite::AesGcm;
        }

        let rs = &mut self.redundancy_scheme;
        if rs.algorithm == RedundancyAlgorithm::Unspecified {
            rs.algorithm = RedundancyAlgorithm::ReedSolomon;
        }
        if rs.share_size == 0 {
            rs.share_size = DEFAULT_SHARE_SIZE;
        }
        if rs.required_shares == 0 {
            rs.required_shares = DEFAULT_REQUIRED_SHARES;
        }
        if rs.repair_shares == 0 {
            rs.repair_shares = DEFAULT_REPAIR_SHARES;
        }
        if rs.optimal_shares == 0 {
            rs.optimal_shares = DEFAULT_OPTIMAL_SHARES;
        }
        if rs.total_shares == 0 {
            rs.total_shares = DEFAULT_TOTAL_SHARES;
        }

        let stripe = rs.share_size.saturating_mul(u32::from(rs.required_shares));
        let ep = &mut self.encryption_parameters;
        if ep.cipher_suite == CipherSuite::Unspecified {
            ep.cipher_suite = CipherSuite::AesGcm;
        }
        if ep.block_size == 0 {
            ep.block_size = stripe;
        }

        if self.segment_size == 0 {
            self.segment_size = DEFAULT_SEGMENT_SIZE;
        }
        self
    }

    /// Validate a config after defaults have been applied.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let rs = &self.redundancy_scheme;
        if rs.required_shares == 0
            || rs.required_shares > rs.repair_shares
            || rs.repair_shares > rs.optimal_shares
            || rs.optimal_shares > rs.total_shares
        {
            return Err(BridgeError::InvalidConfig(format!(
                "redundancy thresholds must satisfy 0 < required <= repair <= optimal <= total, got {}/{}/{}/{}",
                rs.required_shares, rs.repair_shares, rs.optimal_shares, rs.total_shares
            )));
        }

        if rs.share_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "share_size must be positive".to_string(),
            ));
        }

        let stripe = u64::from(rs.share_size) * u64::from(rs.required_shares);
        let block = u64::from(self.encryption_parameters.block_size);
        if block == 0 || block % stripe != 0 {
            return Err(BridgeError::InvalidConfig(format!(
                "block_size ({block}) must be a positive multiple of share_size * required_shares ({stripe})"
            )));
        }

        if self.segment_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "segment_size must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Metadata of an existing bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bucket {
    /// Bucket name.
    pub name: String,
    /// Creation time (unix seconds).
    pub created: u64,
    /// Cipher used for object paths.
    pub path_cipher: CipherSuite,
    /// Object data encryption.
    pub encryption_parameters: EncryptionParameters,
    /// Object data redundancy.
    pub redundancy_scheme: RedundancyScheme,
    /// Maximum segment size in bytes.
    pub segment_size: u64,
}

impl SnapshotSchema for Bucket {
    const TAG: TypeTag = TypeTag::Bucket;
    const FIELDS: &'static [&'static str] = &[
        "name",
        "created",
        "path_cipher",
        "encryption_parameters",
        "encryption_parameters.cipher_suite",
        "encryption_parameters.block_size",
        "redundancy_scheme",
        "redundancy_scheme.algorithm",
        "redundancy_scheme.share_size",
        "redundancy_scheme.required_shares",
        "redundancy_scheme.repair_shares",
        "redundancy_scheme.optimal_shares",
        "redundancy_scheme.total_shares",
        "segment_size",
    ];
}

impl Bucket {
    /// Build bucket metadata from a (defaulted) config.
    pub fn new(name: &str, created: u64, config: &BucketConfig) -> Self {
        Self {
            name: name.to_string(),
            created,
            path_cipher: config.path_cipher,
            encryption_parameters: config.encryption_parameters,
            redundancy_scheme: config.redundancy_scheme,
            segment_size: config.segment_size,
        }
    }
}

/// Check a bucket name.
///
/// Names are 3-63 characters of lowercase letters, digits, `-` and `.`, and
/// start and end with a letter or digit.
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
    if name.len() < 3 || name.len() > 63 {
        return Err(format!(
            "bucket name must be 3-63 characters, got {}",
            name.len()
        ));
    }

    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.';
    if let Some(c) = name.chars().find(|&c| !valid_char(c)) {
        return Err(format!("bucket name contains invalid character {c:?}"));
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err("bucket name must start and end with a letter or digit".to_string());
    }

    Ok(())
}
