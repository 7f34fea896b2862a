//! Function-boundary layout descriptors.
//!
//! A boundary records where a single emitted function starts and ends so the
//! loader can treat "one compiled unit = one function" and map or protect its
//! page independently. The file-scoped form derives the symbol name from the
//! compiling unit's identity, forces the start onto a page boundary, and
//! derives the end symbol by suffixing the same identifier.

use serde::{Deserialize, Serialize};

use crate::LAYOUT_MANIFEST_SCHEMA_VERSION;

pub const PAGE_SIZE: u64 = 4096;

const END_SYMBOL_SUFFIX: &str = "_end";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    EndBeforeStart { symbol: String, start: u64, end: u64 },
    UnalignedStart { symbol: String, start: u64 },
    EmptySymbol,
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::EndBeforeStart { symbol, start, end } => write!(
                f,
                "boundary {symbol}: end 0x{end:x} precedes start 0x{start:x}"
            ),
            LayoutError::UnalignedStart { symbol, start } => write!(
                f,
                "boundary {symbol}: start 0x{start:x} is not page-aligned"
            ),
            LayoutError::EmptySymbol => write!(f, "boundary symbol is empty"),
        }
    }
}

impl std::error::Error for LayoutError {}

/// One global function symbol with its emitted extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionBoundary {
    pub symbol: String,
    pub start_address: u64,
    pub end_address: u64,
    pub page_aligned: bool,
}

impl FunctionBoundary {
    /// Plain boundary: symbol placed as-is, size recorded as the delta to
    /// the matching end marker.
    pub fn plain(symbol: &str, start_address: u64, end_address: u64) -> Result<Self, LayoutError> {
        if symbol.is_empty() {
            return Err(LayoutError::EmptySymbol);
        }
        if end_address < start_address {
            return Err(LayoutError::EndBeforeStart {
                symbol: symbol.to_string(),
                start: start_address,
                end: end_address,
            });
        }
        Ok(Self {
            symbol: symbol.to_string(),
            start_address,
            end_address,
            page_aligned: false,
        })
    }

    /// File-scoped boundary: the symbol is the compiling unit's identity,
    /// the start is rounded up to the next page boundary, and the extent
    /// covers `size` bytes from there.
    pub fn file_scoped(unit: &str, start_address: u64, size: u64) -> Result<Self, LayoutError> {
        if unit.is_empty() {
            return Err(LayoutError::EmptySymbol);
        }
        let start = next_page_boundary(start_address);
        Ok(Self {
            symbol: unit.to_string(),
            start_address: start,
            end_address: start + size,
            page_aligned: true,
        })
    }

    /// Symbol name of the matching end marker.
    pub fn end_symbol(&self) -> String {
        format!("{}{}", self.symbol, END_SYMBOL_SUFFIX)
    }

    /// Emitted size: the address delta between the begin and end markers.
    pub fn size(&self) -> u64 {
        self.end_address - self.start_address
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.symbol.is_empty() {
            return Err(LayoutError::EmptySymbol);
        }
        if self.end_address < self.start_address {
            return Err(LayoutError::EndBeforeStart {
                symbol: self.symbol.clone(),
                start: self.start_address,
                end: self.end_address,
            });
        }
        if self.page_aligned && self.start_address % PAGE_SIZE != 0 {
            return Err(LayoutError::UnalignedStart {
                symbol: self.symbol.clone(),
                start: self.start_address,
            });
        }
        Ok(())
    }
}

fn next_page_boundary(addr: u64) -> u64 {
    addr.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Manifest handed to the external build/link step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutManifest {
    pub schema_version: String,
    pub boundaries: Vec<FunctionBoundary>,
}

impl LayoutManifest {
    pub fn new(boundaries: Vec<FunctionBoundary>) -> Self {
        Self {
            schema_version: LAYOUT_MANIFEST_SCHEMA_VERSION.to_string(),
            boundaries,
        }
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        for b in &self.boundaries {
            b.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_boundary_records_size_as_address_delta() {
        let b = FunctionBoundary::plain("vcpu_ecall_exit", 0x8000_0010, 0x8000_0090)
            .expect("valid boundary");
        assert_eq!(b.size(), 0x80);
        assert_eq!(b.end_symbol(), "vcpu_ecall_exit_end");
        assert!(!b.page_aligned);
        b.validate().expect("valid");
    }

    #[test]
    fn plain_boundary_rejects_inverted_extent() {
        let err = FunctionBoundary::plain("f", 0x2000, 0x1000).expect_err("inverted");
        assert!(matches!(err, LayoutError::EndBeforeStart { .. }));
    }

    #[test]
    fn file_scoped_boundary_page_aligns_and_derives_end_symbol() {
        let b = FunctionBoundary::file_scoped("vipi_user_ipi_remote", 0x8000_0123, 0x40)
            .expect("valid boundary");
        assert_eq!(b.start_address % PAGE_SIZE, 0);
        assert_eq!(b.start_address, 0x8000_1000);
        assert_eq!(b.size(), 0x40);
        assert_eq!(b.end_symbol(), "vipi_user_ipi_remote_end");
        assert!(b.page_aligned);
        b.validate().expect("valid");
    }

    #[test]
    fn file_scoped_boundary_keeps_aligned_start() {
        let b = FunctionBoundary::file_scoped("unit", 0x8000_2000, 0x10).expect("valid");
        assert_eq!(b.start_address, 0x8000_2000);
    }

    #[test]
    fn validate_flags_unaligned_page_aligned_boundary() {
        let mut b = FunctionBoundary::file_scoped("unit", 0, 0x10).expect("valid");
        b.start_address = 0x123;
        b.end_address = 0x133;
        assert!(matches!(
            b.validate().expect_err("unaligned"),
            LayoutError::UnalignedStart { .. }
        ));
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = LayoutManifest::new(vec![
            FunctionBoundary::plain("a", 0, 16).expect("valid"),
            FunctionBoundary::file_scoped("b", 17, 32).expect("valid"),
        ]);
        manifest.validate().expect("valid");
        let text = serde_json::to_string(&manifest).expect("serialize");
        let back: LayoutManifest = serde_json::from_str(&text).expect("parse");
        assert_eq!(back, manifest);
        assert_eq!(back.schema_version, LAYOUT_MANIFEST_SCHEMA_VERSION);
    }
}
