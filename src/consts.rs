//! VM parameters

/* TYPES */

/// One stack word. Shorts and references occupy one word; ints occupy two,
/// pushed low-order first.
pub type Word = i16;

/// Runtime package identifier.
pub type PackageId = u8;

/// Applet identifier; the firewall key of a context.
pub type AppletId = u8;

/// Byte offset of a class or interface info record inside the class
/// component of its package.
pub type ClassIndex = u16;

/// Index of an entry in the constant pool component.
pub type CpOffset = u16;

/* LIMITS */

/// Word capacity of the frame stack arena.
pub const STACK_WORDS: usize = 1024;

/// Number of package slots in the store's packages-list bitmap. Must stay a
/// multiple of 8.
pub const MAX_PACKAGES: usize = 64;

/// Upper bound for a persistent-store key, in bytes.
pub const TAG_MAX_LEN: usize = 32;

/// Saved-PC slots available per frame for `jsr`/`ret`.
pub const SAVED_PC_SLOTS: usize = 4;

/// Upper bound for a package or applet AID, in bytes.
pub const AID_MAX_LEN: usize = 16;

/// Largest live-object registry index a compact reference can carry.
pub const MAX_HEAP_OBJECTS: usize = 0x7fff;

/* IMAGE FORMAT */

/// Sentinel superclass reference naming the root `Object` class.
pub const OBJECT_CLASS_SENTINEL: u16 = 0xffff;

/// Sentinel element-class offset carried by primitive arrays.
pub const NO_ELEMENT_CLASS: CpOffset = 0xffff;

/// Method header flag bit: extended (full-byte) header form.
pub const METHOD_FLAG_EXTENDED: u8 = 0x8;

/// Method header flag bit: abstract method; must never reach invoke.
pub const METHOD_FLAG_ABSTRACT: u8 = 0x4;

/// Class info flag bit: the record describes an interface.
pub const CLASS_FLAG_INTERFACE: u8 = 0x8;

/// Package header feature flag: the `int` type is used.
pub const CAP_FLAG_INT: u8 = 0x01;

/// Package header feature flag: an export component is present.
pub const CAP_FLAG_EXPORT: u8 = 0x02;

/// Package header feature flag: an applet component is present.
pub const CAP_FLAG_APPLET: u8 = 0x04;
