//! Package image reader.
//!
//! A package image is a sequence of eleven tagged, size-prefixed
//! components. The reader walks the image once, recording where each known
//! component lives, and rejects duplicate or unknown tags as security.
//! Every accessor returns a view into the underlying bytes; nothing is
//! copied out of the image. All multi-byte integers are big-endian.

use std::collections::BTreeMap;

use crate::consts::PackageId;
use crate::error::Exception;
use crate::storage::{Store, Tag};

mod class;
mod components;
mod constant_pool;
mod method;

pub use class::{ClassInfo, ImplementedInterface, InterfaceInfo};
pub use components::{Applet, AppletEntry, Directory, Export, ExportedClass, Header, Import, PackageInfo};
pub use constant_pool::{ClassRef, ConstantPool, CpEntry, StaticRef};
pub use method::{ExceptionHandler, MethodComponent, MethodHeader};

/// Component tags of the package image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentTag {
    /// Format version, feature flags and the package AID.
    Header = 1,
    /// Per-component sizes and table counts.
    Directory = 2,
    /// Applet AIDs and install entry points.
    Applet = 3,
    /// Imported package AIDs and versions.
    Import = 4,
    /// The constant pool entries.
    ConstantPool = 5,
    /// Interleaved interface-info and class-info records.
    Class = 6,
    /// Exception handlers and packed method bodies.
    Method = 7,
    /// The static-field image.
    StaticField = 8,
    /// Offsets patched at link time; opaque to the core.
    ReferenceLocation = 9,
    /// Exported classes with their static members.
    Export = 10,
    /// Debugging metadata; opaque to the core.
    Descriptor = 11,
}

impl ComponentTag {
    const COUNT: usize = 11;

    const fn slot(self) -> usize {
        self as usize - 1
    }

    const fn decode(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Header),
            2 => Some(Self::Directory),
            3 => Some(Self::Applet),
            4 => Some(Self::Import),
            5 => Some(Self::ConstantPool),
            6 => Some(Self::Class),
            7 => Some(Self::Method),
            8 => Some(Self::StaticField),
            9 => Some(Self::ReferenceLocation),
            10 => Some(Self::Export),
            11 => Some(Self::Descriptor),
            _ => None,
        }
    }
}

pub(crate) fn u8_at(bytes: &[u8], at: usize) -> Result<u8, Exception> {
    bytes.get(at).copied().ok_or(Exception::Security)
}

pub(crate) fn u16_at(bytes: &[u8], at: usize) -> Result<u16, Exception> {
    match bytes.get(at..at + 2) {
        Some([hi, lo]) => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(Exception::Security),
    }
}

pub(crate) fn slice_at(bytes: &[u8], at: usize, len: usize) -> Result<&[u8], Exception> {
    bytes.get(at..at + len).ok_or(Exception::Security)
}

/// One parsed package image: the raw bytes plus the recorded component
/// locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageImage {
    id: PackageId,
    bytes: Vec<u8>,
    components: [Option<(usize, usize)>; ComponentTag::COUNT],
}

impl PackageImage {
    /// Walk the image, recording each component. Structural
    /// inconsistencies, duplicate tags and unknown tags fault as security.
    pub fn parse(id: PackageId, bytes: Vec<u8>) -> Result<Self, Exception> {
        let mut components = [None; ComponentTag::COUNT];
        let mut at = 0;

        while at < bytes.len() {
            let tag = ComponentTag::decode(u8_at(&bytes, at)?).ok_or(Exception::Security)?;
            let size = u16_at(&bytes, at + 1)? as usize;
            let body = at + 3;

            if body + size > bytes.len() {
                return Err(Exception::Security);
            }
            if components[tag.slot()].is_some() {
                return Err(Exception::Security);
            }

            components[tag.slot()] = Some((body, size));
            at = body + size;
        }

        Ok(Self {
            id,
            bytes,
            components,
        })
    }

    /// The runtime package id this image is installed under.
    pub const fn id(&self) -> PackageId {
        self.id
    }

    fn component(&self, tag: ComponentTag) -> Result<&[u8], Exception> {
        let (at, len) = self.components[tag.slot()].ok_or(Exception::Security)?;
        Ok(&self.bytes[at..at + len])
    }

    /// Whether the image carries `tag`.
    pub fn has_component(&self, tag: ComponentTag) -> bool {
        self.components[tag.slot()].is_some()
    }

    /// The header component.
    pub fn header(&self) -> Result<Header<'_>, Exception> {
        Header::new(self.component(ComponentTag::Header)?)
    }

    /// The directory component.
    pub fn directory(&self) -> Result<Directory<'_>, Exception> {
        Directory::new(self.component(ComponentTag::Directory)?)
    }

    /// The applet component.
    pub fn applet(&self) -> Result<Applet<'_>, Exception> {
        Applet::new(self.component(ComponentTag::Applet)?)
    }

    /// The import component.
    pub fn import(&self) -> Result<Import<'_>, Exception> {
        Import::new(self.component(ComponentTag::Import)?)
    }

    /// The constant pool component.
    pub fn constant_pool(&self) -> Result<ConstantPool<'_>, Exception> {
        ConstantPool::new(self.component(ComponentTag::ConstantPool)?)
    }

    /// The class component's info area; [`crate::consts::ClassIndex`]
    /// values are byte offsets into this slice.
    pub fn class_infos(&self) -> Result<&[u8], Exception> {
        self.component(ComponentTag::Class)
    }

    /// The class-info record at `class_index`.
    pub fn class_info(&self, class_index: u16) -> Result<ClassInfo<'_>, Exception> {
        ClassInfo::at(self.class_infos()?, class_index)
    }

    /// The method component.
    pub fn method_component(&self) -> Result<MethodComponent<'_>, Exception> {
        MethodComponent::new(self.component(ComponentTag::Method)?)
    }

    /// The static-field component image.
    pub fn static_field_image(&self) -> Result<&[u8], Exception> {
        self.component(ComponentTag::StaticField)
    }

    /// The export component.
    pub fn export(&self) -> Result<Export<'_>, Exception> {
        Export::new(self.component(ComponentTag::Export)?)
    }

    /// The reference-location component, opaque.
    pub fn reference_location(&self) -> Result<&[u8], Exception> {
        self.component(ComponentTag::ReferenceLocation)
    }

    /// The descriptor component, opaque.
    pub fn descriptor(&self) -> Result<&[u8], Exception> {
        self.component(ComponentTag::Descriptor)
    }
}

/// Registry of installed package images, loaded from the store on demand
/// and cached for the session. Only raw images are cached; constant-pool
/// resolution always starts from scratch.
#[derive(Debug, Default, Clone)]
pub struct PackageTable {
    images: BTreeMap<PackageId, PackageImage>,
}

impl PackageTable {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (if needed) and return the image of `id`.
    pub fn ensure<S>(&mut self, store: &S, id: PackageId) -> Result<&PackageImage, Exception>
    where
        S: Store + ?Sized,
    {
        if !self.images.contains_key(&id) {
            let bytes = store.read_in_place(&Tag::cap(id))?.to_vec();
            let image = PackageImage::parse(id, bytes)?;
            self.images.insert(id, image);
        }

        Ok(&self.images[&id])
    }

    /// Return the already-loaded image of `id`.
    pub fn get(&self, id: PackageId) -> Result<&PackageImage, Exception> {
        self.images.get(&id).ok_or(Exception::Security)
    }

    /// Translate an imported package AID + version to a runtime package
    /// id, by linear search over the populated package slots.
    pub fn find_by_aid<S>(
        &mut self,
        store: &S,
        aid: &[u8],
        major: u8,
        minor: u8,
    ) -> Result<PackageId, Exception>
    where
        S: Store + ?Sized,
    {
        for id in 0..crate::consts::MAX_PACKAGES as u8 {
            if !crate::storage::package_present(store, id) {
                continue;
            }

            let header = self.ensure(store, id)?.header()?;
            let package = header.package()?;

            if package.aid()? == aid && package.major() == major && package.minor() == minor {
                return Ok(id);
            }
        }

        Err(Exception::Runtime)
    }
}
