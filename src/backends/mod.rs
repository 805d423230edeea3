//! Concrete backends. [`m6800`] is the reference implementation exercising
//! the full attribute/transform/label machinery.

pub mod m6800;

use crate::backend::Backend;

/// One entry in the process-wide backend registry: a code name plus a
/// factory to construct it. Grounded on `original_source/dasmfw.cpp`'s
/// `RegisterDisassembler`/`CreateDisassembler`/`Disassemblers[]` global
/// table (lines 33-108) -- sorted-insert array of name+factory pairs,
/// looked up by exact name match. This crate only ships one backend, so the
/// table is a single static entry rather than a runtime-populated array,
/// but the lookup shape (`available_backends().iter().find(...)`) is the
/// same "freeze after startup" registry  calls for.
pub struct BackendEntry {
    pub code: &'static str,
    pub create: fn() -> Box<dyn Backend>,
}

/// The process-wide, frozen-after-startup backend registry: global registries
/// initialize once at startup and freeze thereafter.
pub fn available_backends() -> &'static [BackendEntry] {
    &[BackendEntry {
        code: "6800",
        create: || Box::new(m6800::M6800::new()),
    }]
}

/// `CreateDisassembler`: looks up a backend by its code name.
pub fn create_backend(code: &str) -> Option<Box<dyn Backend>> {
    available_backends()
        .iter()
        .find(|b| b.code.eq_ignore_ascii_case(code))
        .map(|b| (b.create)())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_finds_6800_by_code() {
        let backend = create_backend("6800").expect("6800 backend registered");
        assert_eq!(backend.name(), "Motorola 6800");
    }

    #[test]
    fn registry_rejects_unknown_code() {
        assert!(create_backend("6502").is_none());
    }
}
