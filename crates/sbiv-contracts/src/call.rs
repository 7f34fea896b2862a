use crate::{error_code, sbi_legacy::*, sbi_test::*, ECALL_VM_TEST_END};

/// Number of argument registers in the legacy call convention (a0..a5).
pub const ECALL_ARG_SLOTS: usize = 6;

/// The raw register frame of a trapped ecall: a7 carries the extension id,
/// a6 the function id (always zero for the legacy/test calls modeled here),
/// a0..a5 the arguments. This is the only thing that crosses the guest/host
/// boundary; both sides agree on it through this crate alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEcall {
    /* EID - a7 */
    pub ext_id: u64,

    /* FID - a6 */
    pub func_id: u64,

    /* Args - a0~a5 */
    pub args: [u64; ECALL_ARG_SLOTS],
}

impl RawEcall {
    pub fn new(ext_id: u64) -> Self {
        Self {
            ext_id,
            func_id: 0,
            args: [0; ECALL_ARG_SLOTS],
        }
    }

    fn with_args(ext_id: u64, filled: &[u64]) -> Self {
        let mut raw = Self::new(ext_id);
        raw.args[..filled.len()].copy_from_slice(filled);
        raw
    }
}

/// Value returned to the guest in a0/a1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbiRet {
    /* a0 */
    pub error: i64,

    /* a1 */
    pub value: u64,
}

impl SbiRet {
    pub fn ok(value: u64) -> Self {
        Self {
            error: error_code::SBI_SUCCESS,
            value,
        }
    }

    pub fn err(error: i64) -> Self {
        Self { error, value: 0 }
    }

    pub fn is_ok(&self) -> bool {
        self.error == error_code::SBI_SUCCESS
    }
}

/// One strongly-typed variant per guest-visible call. Encoding a variant and
/// decoding the resulting frame always round-trips; an arity or type mismatch
/// is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbiCall {
    SetTimer { deadline: u64 },
    ConsolePutchar { ch: u8 },
    ConsoleGetchar,
    ClearIpi,
    SendIpi { hart_mask: u64 },
    RemoteFenceI { hart_mask: u64 },
    RemoteSfenceVma { hart_mask: u64, addr: u64, size: u64 },
    RemoteSfenceVmaAsid { hart_mask: u64, addr: u64, size: u64, asid: u64 },
    Shutdown,
    HuUserIpi { target: u64 },
    HuVirtualIpi { target: u64 },
    GetVcpuId,
    SyncWait { flag: u64 },
    SyncSet { flag: u64 },
    TimeStart,
    TimeEnd,
    Success,
    Failed,
    HuLoop,
    VmTestEnd,
}

impl SbiCall {
    /// Extension id this call traps with (the terminator sentinel for
    /// `VmTestEnd`).
    pub fn ext_id(&self) -> u64 {
        match self {
            SbiCall::SetTimer { .. } => SBI_EXT_0_1_SET_TIMER,
            SbiCall::ConsolePutchar { .. } => SBI_EXT_0_1_CONSOLE_PUTCHAR,
            SbiCall::ConsoleGetchar => SBI_EXT_0_1_CONSOLE_GETCHAR,
            SbiCall::ClearIpi => SBI_EXT_0_1_CLEAR_IPI,
            SbiCall::SendIpi { .. } => SBI_EXT_0_1_SEND_IPI,
            SbiCall::RemoteFenceI { .. } => SBI_EXT_0_1_REMOTE_FENCE_I,
            SbiCall::RemoteSfenceVma { .. } => SBI_EXT_0_1_REMOTE_SFENCE_VMA,
            SbiCall::RemoteSfenceVmaAsid { .. } => SBI_EXT_0_1_REMOTE_SFENCE_VMA_ASID,
            SbiCall::Shutdown => SBI_EXT_0_1_SHUTDOWN,
            SbiCall::HuUserIpi { .. } => SBI_TEST_HU_USER_IPI,
            SbiCall::HuVirtualIpi { .. } => SBI_TEST_HU_VIRTUAL_IPI,
            SbiCall::GetVcpuId => SBI_TEST_GET_VCPU_ID,
            SbiCall::SyncWait { .. } => SBI_TEST_SYNC_WAIT,
            SbiCall::SyncSet { .. } => SBI_TEST_SYNC_SET,
            SbiCall::TimeStart => SBI_TEST_TIME_START,
            SbiCall::TimeEnd => SBI_TEST_TIME_END,
            SbiCall::Success => SBI_TEST_SUCCESS,
            SbiCall::Failed => SBI_TEST_FAILED,
            SbiCall::HuLoop => SBI_TEST_HU_LOOP,
            SbiCall::VmTestEnd => ECALL_VM_TEST_END,
        }
    }

    /// Packages the call into the register frame, id first, then arguments
    /// in a0..a5.
    pub fn encode(&self) -> RawEcall {
        let id = self.ext_id();
        match *self {
            SbiCall::SetTimer { deadline } => RawEcall::with_args(id, &[deadline]),
            SbiCall::ConsolePutchar { ch } => RawEcall::with_args(id, &[u64::from(ch)]),
            SbiCall::SendIpi { hart_mask } => RawEcall::with_args(id, &[hart_mask]),
            SbiCall::RemoteFenceI { hart_mask } => RawEcall::with_args(id, &[hart_mask]),
            SbiCall::RemoteSfenceVma {
                hart_mask,
                addr,
                size,
            } => RawEcall::with_args(id, &[hart_mask, addr, size]),
            SbiCall::RemoteSfenceVmaAsid {
                hart_mask,
                addr,
                size,
                asid,
            } => RawEcall::with_args(id, &[hart_mask, addr, size, asid]),
            SbiCall::HuUserIpi { target } => RawEcall::with_args(id, &[target]),
            SbiCall::HuVirtualIpi { target } => RawEcall::with_args(id, &[target]),
            SbiCall::SyncWait { flag } => RawEcall::with_args(id, &[flag]),
            SbiCall::SyncSet { flag } => RawEcall::with_args(id, &[flag]),
            SbiCall::ConsoleGetchar
            | SbiCall::ClearIpi
            | SbiCall::Shutdown
            | SbiCall::GetVcpuId
            | SbiCall::TimeStart
            | SbiCall::TimeEnd
            | SbiCall::Success
            | SbiCall::Failed
            | SbiCall::HuLoop
            | SbiCall::VmTestEnd => RawEcall::new(id),
        }
    }

    /// True for calls whose handler does not resume the guest.
    pub fn never_returns(&self) -> bool {
        matches!(self, SbiCall::Shutdown | SbiCall::VmTestEnd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownExtension { ext_id: u64 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownExtension { ext_id } => {
                write!(f, "no handler registered for extension id 0x{ext_id:x}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl RawEcall {
    /// Recovers the typed call from the register frame: extension id first,
    /// then arguments from their fixed positions.
    pub fn decode(&self) -> Result<SbiCall, DecodeError> {
        let a = &self.args;
        let call = match self.ext_id {
            SBI_EXT_0_1_SET_TIMER => SbiCall::SetTimer { deadline: a[0] },
            SBI_EXT_0_1_CONSOLE_PUTCHAR => SbiCall::ConsolePutchar { ch: a[0] as u8 },
            SBI_EXT_0_1_CONSOLE_GETCHAR => SbiCall::ConsoleGetchar,
            SBI_EXT_0_1_CLEAR_IPI => SbiCall::ClearIpi,
            SBI_EXT_0_1_SEND_IPI => SbiCall::SendIpi { hart_mask: a[0] },
            SBI_EXT_0_1_REMOTE_FENCE_I => SbiCall::RemoteFenceI { hart_mask: a[0] },
            SBI_EXT_0_1_REMOTE_SFENCE_VMA => SbiCall::RemoteSfenceVma {
                hart_mask: a[0],
                addr: a[1],
                size: a[2],
            },
            SBI_EXT_0_1_REMOTE_SFENCE_VMA_ASID => SbiCall::RemoteSfenceVmaAsid {
                hart_mask: a[0],
                addr: a[1],
                size: a[2],
                asid: a[3],
            },
            SBI_EXT_0_1_SHUTDOWN => SbiCall::Shutdown,
            SBI_TEST_HU_USER_IPI => SbiCall::HuUserIpi { target: a[0] },
            SBI_TEST_HU_VIRTUAL_IPI => SbiCall::HuVirtualIpi { target: a[0] },
            SBI_TEST_GET_VCPU_ID => SbiCall::GetVcpuId,
            SBI_TEST_SYNC_WAIT => SbiCall::SyncWait { flag: a[0] },
            SBI_TEST_SYNC_SET => SbiCall::SyncSet { flag: a[0] },
            SBI_TEST_TIME_START => SbiCall::TimeStart,
            SBI_TEST_TIME_END => SbiCall::TimeEnd,
            SBI_TEST_SUCCESS => SbiCall::Success,
            SBI_TEST_FAILED => SbiCall::Failed,
            SBI_TEST_HU_LOOP => SbiCall::HuLoop,
            ECALL_VM_TEST_END => SbiCall::VmTestEnd,
            other => return Err(DecodeError::UnknownExtension { ext_id: other }),
        };
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup;

    const ALL_CALLS: &[SbiCall] = &[
        SbiCall::SetTimer { deadline: 0x1234 },
        SbiCall::ConsolePutchar { ch: b'x' },
        SbiCall::ConsoleGetchar,
        SbiCall::ClearIpi,
        SbiCall::SendIpi { hart_mask: 0b1010 },
        SbiCall::RemoteFenceI { hart_mask: 0b11 },
        SbiCall::RemoteSfenceVma {
            hart_mask: 1,
            addr: 0x8000_0000,
            size: 0x1000,
        },
        SbiCall::RemoteSfenceVmaAsid {
            hart_mask: 1,
            addr: 0x8000_0000,
            size: 0x1000,
            asid: 7,
        },
        SbiCall::Shutdown,
        SbiCall::HuUserIpi { target: 2 },
        SbiCall::HuVirtualIpi { target: 1 },
        SbiCall::GetVcpuId,
        SbiCall::SyncWait { flag: 3 },
        SbiCall::SyncSet { flag: 3 },
        SbiCall::TimeStart,
        SbiCall::TimeEnd,
        SbiCall::Success,
        SbiCall::Failed,
        SbiCall::HuLoop,
        SbiCall::VmTestEnd,
    ];

    #[test]
    fn decode_recovers_every_encoded_call() {
        for call in ALL_CALLS {
            let raw = call.encode();
            assert_eq!(raw.ext_id, call.ext_id());
            assert_eq!(raw.func_id, 0);
            assert_eq!(raw.decode().expect("registered id"), *call);
        }
    }

    #[test]
    fn every_encodable_id_is_in_the_registry() {
        for call in ALL_CALLS {
            if matches!(call, SbiCall::VmTestEnd) {
                continue; // sentinel, deliberately outside the namespace
            }
            let id = call.ext_id();
            assert!(
                crate::extension_names().any(|n| lookup(n).expect("registered") == id),
                "0x{id:x} missing from registry"
            );
        }
    }

    #[test]
    fn decode_rejects_unregistered_id() {
        let raw = RawEcall::new(0xDEADBEEF);
        assert_eq!(
            raw.decode(),
            Err(DecodeError::UnknownExtension { ext_id: 0xDEADBEEF })
        );
    }

    #[test]
    fn argument_positions_match_the_register_convention() {
        let raw = SbiCall::RemoteSfenceVmaAsid {
            hart_mask: 0xA,
            addr: 0xB,
            size: 0xC,
            asid: 0xD,
        }
        .encode();
        assert_eq!(raw.args, [0xA, 0xB, 0xC, 0xD, 0, 0]);
    }

    #[test]
    fn non_returning_calls_are_marked() {
        assert!(SbiCall::Shutdown.never_returns());
        assert!(SbiCall::VmTestEnd.never_returns());
        assert!(!SbiCall::HuLoop.never_returns()); // ends only via injected irq
        assert!(!SbiCall::Success.never_returns());
    }
}
