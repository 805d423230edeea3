#![forbid(unsafe_code)]

//! `dasmfw` is a retargetable disassembler framework: a sparse, typed
//! address-space/attribute overlay plus a two-pass parse-then-render engine,
//! with a narrow backend contract so new processors can be plugged in
//! without touching the engine.
//!
//! See `backends::m6800` for the reference Motorola 6800 backend.

pub mod attributes;
pub mod backend;
pub mod backends;
pub mod comments;
pub mod database;
pub mod engine;
pub mod info;
pub mod labels;
pub mod loaders;
pub mod memmap;
pub mod store;
pub mod transforms;

use std::fmt;

/// A bus-agnostic address. Wide enough for every bus this crate targets
/// (up to 32 bits); the 6800 reference backend only ever uses the low 16.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Addr(pub u32);

impl Addr {
    /// Absent/unknown address. Never a valid mapped address.
    pub const NO_ADDRESS: Addr = Addr(u32::MAX);
    /// "Use the natural value" sentinel, distinct from [`Addr::NO_ADDRESS`].
    pub const DEFAULT_ADDRESS: Addr = Addr(u32::MAX - 1);

    pub const fn new(value: u32) -> Self {
        Addr(value)
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::NO_ADDRESS.0 && self.0 != Self::DEFAULT_ADDRESS.0
    }

    pub fn checked_add(self, rhs: u32) -> Option<Addr> {
        self.0.checked_add(rhs).map(Addr)
    }

    pub fn wrapping_add_signed(self, rhs: i32) -> Addr {
        Addr(self.0.wrapping_add(rhs as u32))
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Addr::NO_ADDRESS => write!(f, "Addr(NO_ADDRESS)"),
            Addr::DEFAULT_ADDRESS => write!(f, "Addr(DEFAULT_ADDRESS)"),
            Addr(v) => write!(f, "Addr({v:#x})"),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::UpperHex for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

impl fmt::LowerHex for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl core::ops::Add<u32> for Addr {
    type Output = Addr;
    fn add(self, rhs: u32) -> Addr {
        Addr(self.0.wrapping_add(rhs))
    }
}

impl core::ops::Sub<u32> for Addr {
    type Output = Addr;
    fn sub(self, rhs: u32) -> Addr {
        Addr(self.0.wrapping_sub(rhs))
    }
}

impl core::ops::Sub for Addr {
    type Output = u32;
    fn sub(self, rhs: Addr) -> u32 {
        self.0.wrapping_sub(rhs.0)
    }
}

/// One of the three independent address spaces a backend may expose.
///
/// Von Neumann processors (the 6800) only ever populate [`Bus::Code`].
/// Harvard processors may populate all three. Every addressed operation in
/// this crate takes a `Bus`; there is no implicit "current bus" state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bus {
    Code,
    Data,
    Io,
}

impl Bus {
    pub const COUNT: usize = 3;
    pub const ALL: [Bus; 3] = [Bus::Code, Bus::Data, Bus::Io];

    pub const fn index(self) -> usize {
        match self {
            Bus::Code => 0,
            Bus::Data => 1,
            Bus::Io => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Bus::Code => "code",
            Bus::Data => "data",
            Bus::Io => "io",
        }
    }

    pub fn from_name(name: &str) -> Option<Bus> {
        match name.to_ascii_lowercase().as_str() {
            "code" | "0" => Some(Bus::Code),
            "data" | "1" => Some(Bus::Data),
            "io" | "2" => Some(Bus::Io),
            _ => None,
        }
    }
}

/// Memory kind for a span of bytes, mirrored between the [`memmap`] store and
/// the [`attributes`] overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryType {
    Untyped,
    Code,
    Data,
    Const,
    Bss,
    Io,
}

/// Target endianness of a backend's buses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Bus topology: whether code and data share an address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Architecture {
    VonNeumann,
    Harvard,
}
