//! Shared, version-pinned ABI identifiers for the SBI verification harness.
//!
//! These constants are the single source of truth for the guest-visible call
//! surface: legacy extension ids, the test-extension space, SBI return codes,
//! and the schema/version strings that appear in machine-readable output.
//! Guest-side encoding and host-side decoding both live here so the two can
//! never drift apart.

mod call;
pub mod layout;

pub use call::{DecodeError, RawEcall, SbiCall, SbiRet, ECALL_ARG_SLOTS};

pub const RUN_REPORT_SCHEMA_VERSION: &str = "sbiv.run.report@0.1.0";
pub const LAYOUT_MANIFEST_SCHEMA_VERSION: &str = "sbiv.layout.manifest@0.1.0";

/// Legacy SBI 0.1 extension ids (the STANDARD range).
pub mod sbi_legacy {
    pub const SBI_EXT_0_1_SET_TIMER: u64 = 0x0;
    pub const SBI_EXT_0_1_CONSOLE_PUTCHAR: u64 = 0x1;
    pub const SBI_EXT_0_1_CONSOLE_GETCHAR: u64 = 0x2;
    pub const SBI_EXT_0_1_CLEAR_IPI: u64 = 0x3;
    pub const SBI_EXT_0_1_SEND_IPI: u64 = 0x4;
    pub const SBI_EXT_0_1_REMOTE_FENCE_I: u64 = 0x5;
    pub const SBI_EXT_0_1_REMOTE_SFENCE_VMA: u64 = 0x6;
    pub const SBI_EXT_0_1_REMOTE_SFENCE_VMA_ASID: u64 = 0x7;
    pub const SBI_EXT_0_1_SHUTDOWN: u64 = 0x8;
}

/// Custom test extensions (the TEST range).
///
/// The space 0xC000000-0xCFFFFFF is reserved far above the legacy ids so a
/// future standard extension can never alias a test call.
pub mod sbi_test {
    pub const SBI_TEST_SPACE_START: u64 = 0xC000000;
    pub const SBI_TEST_SPACE_END: u64 = 0xCFFFFFF;

    pub const SBI_TEST_HU_USER_IPI: u64 = 0xC000000;
    pub const SBI_TEST_HU_VIRTUAL_IPI: u64 = 0xC000001;
    pub const SBI_TEST_GET_VCPU_ID: u64 = 0xC000002;
    pub const SBI_TEST_SYNC_WAIT: u64 = 0xC000003;
    pub const SBI_TEST_SYNC_SET: u64 = 0xC000004;
    pub const SBI_TEST_TIME_START: u64 = 0xC000005;
    pub const SBI_TEST_TIME_END: u64 = 0xC000006;
    pub const SBI_TEST_SUCCESS: u64 = 0xC000007;
    pub const SBI_TEST_FAILED: u64 = 0xC000008;

    /* Keep the issuing hart busy in the host until an injected interrupt. */
    pub const SBI_TEST_HU_LOOP: u64 = 0xC100000;
}

/// Terminator sentinel. Not an extension id: it is checked before extension
/// routing and is the only call guaranteed to end guest execution.
pub const ECALL_VM_TEST_END: u64 = 0xFF;

/// SBI return codes carried in a0.
pub mod error_code {
    pub const SBI_SUCCESS: i64 = 0;
    pub const SBI_ERR_FAILURE: i64 = -1;
    pub const SBI_ERR_NOT_SUPPORTED: i64 = -2;
    pub const SBI_ERR_INVALID_PARAM: i64 = -3;
    pub const SBI_ERR_DENIED: i64 = -4;
    pub const SBI_ERR_INVALID_ADDRESS: i64 = -5;
}

/// Static name -> extension id table. No dynamic registration: the guest
/// surface is fixed at build time.
const EXTENSIONS: &[(&str, u64)] = &[
    ("SET_TIMER", sbi_legacy::SBI_EXT_0_1_SET_TIMER),
    ("CONSOLE_PUTCHAR", sbi_legacy::SBI_EXT_0_1_CONSOLE_PUTCHAR),
    ("CONSOLE_GETCHAR", sbi_legacy::SBI_EXT_0_1_CONSOLE_GETCHAR),
    ("CLEAR_IPI", sbi_legacy::SBI_EXT_0_1_CLEAR_IPI),
    ("SEND_IPI", sbi_legacy::SBI_EXT_0_1_SEND_IPI),
    ("REMOTE_FENCE_I", sbi_legacy::SBI_EXT_0_1_REMOTE_FENCE_I),
    ("REMOTE_SFENCE_VMA", sbi_legacy::SBI_EXT_0_1_REMOTE_SFENCE_VMA),
    (
        "REMOTE_SFENCE_VMA_ASID",
        sbi_legacy::SBI_EXT_0_1_REMOTE_SFENCE_VMA_ASID,
    ),
    ("SHUTDOWN", sbi_legacy::SBI_EXT_0_1_SHUTDOWN),
    ("HU_USER_IPI", sbi_test::SBI_TEST_HU_USER_IPI),
    ("HU_VIRTUAL_IPI", sbi_test::SBI_TEST_HU_VIRTUAL_IPI),
    ("GET_VCPU_ID", sbi_test::SBI_TEST_GET_VCPU_ID),
    ("SYNC_WAIT", sbi_test::SBI_TEST_SYNC_WAIT),
    ("SYNC_SET", sbi_test::SBI_TEST_SYNC_SET),
    ("TIME_START", sbi_test::SBI_TEST_TIME_START),
    ("TIME_END", sbi_test::SBI_TEST_TIME_END),
    ("SUCCESS", sbi_test::SBI_TEST_SUCCESS),
    ("FAILED", sbi_test::SBI_TEST_FAILED),
    ("HU_LOOP", sbi_test::SBI_TEST_HU_LOOP),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownExtension {
    pub query: String,
}

impl std::fmt::Display for UnknownExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown SBI extension: {:?}", self.query)
    }
}

impl std::error::Error for UnknownExtension {}

/// Resolves an extension name to its id.
pub fn lookup(name: &str) -> Result<u64, UnknownExtension> {
    EXTENSIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
        .ok_or_else(|| UnknownExtension {
            query: name.to_string(),
        })
}

/// True for ids inside the legacy STANDARD range.
pub fn is_legacy(ext_id: u64) -> bool {
    ext_id <= sbi_legacy::SBI_EXT_0_1_SHUTDOWN
}

/// True for ids inside the reserved test space (including the loop call).
pub fn is_test(ext_id: u64) -> bool {
    (sbi_test::SBI_TEST_SPACE_START..=sbi_test::SBI_TEST_SPACE_END).contains(&ext_id)
        || ext_id == sbi_test::SBI_TEST_HU_LOOP
}

/// All registered extension names, in table order.
pub fn extension_names() -> impl Iterator<Item = &'static str> {
    EXTENSIONS.iter().map(|(n, _)| *n)
}
