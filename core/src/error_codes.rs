//! Stable error codes embedded in every error message.
//!
//! Codes never change meaning once published; new failure modes get new codes.

pub const ID_INVALID_TAG_TYPE: &str = "SHADOW_ID_001";
pub const ID_INVALID_PATH: &str = "SHADOW_ID_002";
pub const ID_INVALID_TAG: &str = "SHADOW_ID_003";
pub const ID_INVALID_POSITION: &str = "SHADOW_ID_004";

pub const SER_DUPLICATE_KEY: &str = "SHADOW_SER_001";
pub const SER_UNKNOWN_KEY_COLUMN: &str = "SHADOW_SER_002";
pub const SER_ROW_WIDTH: &str = "SHADOW_SER_003";

pub const BUILD_DUPLICATE_TABLE: &str = "SHADOW_BUILD_001";
pub const BUILD_WORKBOOK_ID_COLLISION: &str = "SHADOW_BUILD_002";
pub const BUILD_SOURCE: &str = "SHADOW_BUILD_003";
pub const BUILD_STORE: &str = "SHADOW_BUILD_004";
pub const BUILD_CONFIG: &str = "SHADOW_BUILD_005";
pub const BUILD_DUPLICATE_WORKBOOK: &str = "SHADOW_BUILD_006";

pub const REG_IO: &str = "SHADOW_REG_001";
pub const REG_JSON: &str = "SHADOW_REG_002";
pub const REG_CORRUPT: &str = "SHADOW_REG_003";
pub const REG_VERSION: &str = "SHADOW_REG_004";

pub const DIFF_MISSING_ARTIFACT: &str = "SHADOW_DIFF_001";
pub const DIFF_CORRUPT_REGISTRY: &str = "SHADOW_DIFF_002";
pub const DIFF_MALFORMED_ARTIFACT: &str = "SHADOW_DIFF_003";
pub const DIFF_CONFIG: &str = "SHADOW_DIFF_004";

pub const SRC_IO: &str = "SHADOW_SRC_001";
pub const SRC_JSON: &str = "SHADOW_SRC_002";

pub const SCHEMA_IO: &str = "SHADOW_SCHEMA_001";
pub const SCHEMA_FORMAT: &str = "SHADOW_SCHEMA_002";

pub const STORE_IO: &str = "SHADOW_STORE_001";
pub const STORE_MISSING_ARTIFACT: &str = "SHADOW_STORE_002";
pub const STORE_REGISTRY: &str = "SHADOW_STORE_003";

pub const LOAD_MISSING: &str = "SHADOW_LOAD_001";
pub const LOAD_IO: &str = "SHADOW_LOAD_002";
