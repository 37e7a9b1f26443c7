//! Constant-pool resolution and class-hierarchy navigation.
//!
//! Every function resolves from scratch against the package registry; no
//! resolution result is cached. Hierarchy walks are bounded so a crafted
//! image with a superclass cycle faults as security instead of spinning.

use crate::cap::{ClassInfo, ClassRef, CpEntry, PackageTable, StaticRef};
use crate::consts::{ClassIndex, PackageId};
use crate::error::Exception;
use crate::storage::Store;

const MAX_CHAIN: usize = 256;

/// A resolved class: its declaring package and class-info offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassTarget {
    /// Declaring package.
    pub package: PackageId,
    /// Class-info offset inside that package's class component.
    pub class_index: ClassIndex,
}

/// A resolved method: its declaring package and 1-based method-component
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodTarget {
    /// Declaring package.
    pub package: PackageId,
    /// Offset of the method header in that package's method component.
    pub offset: u16,
}

/// A resolved static field: its declaring package and offset into that
/// package's static-field image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticFieldTarget {
    /// Declaring package.
    pub package: PackageId,
    /// Offset into the static-field image.
    pub offset: u16,
}

/// Translate an import-component package token of `from` to a runtime
/// package id.
pub fn import_package<S>(
    packages: &mut PackageTable,
    store: &S,
    from: PackageId,
    package_token: u8,
) -> Result<PackageId, Exception>
where
    S: Store + ?Sized,
{
    let (aid, major, minor) = {
        let import = packages.ensure(store, from)?.import()?;
        let info = import.package(package_token)?;
        (info.aid()?.to_vec(), info.major(), info.minor())
    };

    packages.find_by_aid(store, &aid, major, minor)
}

/// Resolve a class reference of `from`'s constant pool to its declaring
/// package and class-info offset.
pub fn resolve_class_ref<S>(
    packages: &mut PackageTable,
    store: &S,
    from: PackageId,
    class_ref: ClassRef,
) -> Result<ClassTarget, Exception>
where
    S: Store + ?Sized,
{
    match class_ref {
        ClassRef::Internal(offset) => Ok(ClassTarget {
            package: from,
            class_index: offset,
        }),
        ClassRef::External {
            package_token,
            class_token,
        } => {
            let package = import_package(packages, store, from, package_token)?;
            let class_index = {
                let export = packages.ensure(store, package)?.export()?;
                export.class_export(class_token)?.class_offset()?
            };

            Ok(ClassTarget {
                package,
                class_index,
            })
        }
    }
}

/// Resolve constant-pool entry `cp_offset` of `from`, requiring a class
/// reference.
pub fn class_target<S>(
    packages: &mut PackageTable,
    store: &S,
    from: PackageId,
    cp_offset: u16,
) -> Result<ClassTarget, Exception>
where
    S: Store + ?Sized,
{
    let class_ref = {
        let pool = packages.ensure(store, from)?.constant_pool()?;
        pool.class_ref(cp_offset)?
    };

    resolve_class_ref(packages, store, from, class_ref)
}

/// Decode constant-pool entry `cp_offset` of `from`.
pub fn cp_entry<S>(
    packages: &mut PackageTable,
    store: &S,
    from: PackageId,
    cp_offset: u16,
) -> Result<CpEntry, Exception>
where
    S: Store + ?Sized,
{
    packages.ensure(store, from)?.constant_pool()?.entry(cp_offset)
}

fn class_info_of<'a>(
    packages: &'a PackageTable,
    class: ClassTarget,
) -> Result<ClassInfo<'a>, Exception> {
    packages.get(class.package)?.class_info(class.class_index)
}

/// The superclass of `class`; `None` at the root `Object` sentinel.
pub fn super_class<S>(
    packages: &mut PackageTable,
    store: &S,
    class: ClassTarget,
) -> Result<Option<ClassTarget>, Exception>
where
    S: Store + ?Sized,
{
    packages.ensure(store, class.package)?;

    let super_ref = class_info_of(packages, class)?.super_class()?;
    match super_ref {
        None => Ok(None),
        Some(r) => resolve_class_ref(packages, store, class.package, r).map(Some),
    }
}

/// Whether the class-component record at `class` describes an interface.
pub fn is_interface<S>(
    packages: &mut PackageTable,
    store: &S,
    class: ClassTarget,
) -> Result<bool, Exception>
where
    S: Store + ?Sized,
{
    packages.ensure(store, class.package)?;
    class_info_of(packages, class)?.is_interface()
}

/// Total instance size of `class` in words, superclasses included.
pub fn instance_size<S>(
    packages: &mut PackageTable,
    store: &S,
    class: ClassTarget,
) -> Result<u16, Exception>
where
    S: Store + ?Sized,
{
    let mut total = 0u16;
    let mut cursor = Some(class);

    for _ in 0..MAX_CHAIN {
        let Some(current) = cursor else {
            return Ok(total);
        };

        packages.ensure(store, current.package)?;
        let declared = class_info_of(packages, current)?.declared_instance_size()? as u16;
        total = total.checked_add(declared).ok_or(Exception::Security)?;

        cursor = super_class(packages, store, current)?;
    }

    Err(Exception::Security)
}

/// Map an instance-field token of `class` to a field-slot index: the token
/// plus the accumulated instance sizes of every superclass.
pub fn instance_field_slot<S>(
    packages: &mut PackageTable,
    store: &S,
    class: ClassTarget,
    token: u8,
) -> Result<u16, Exception>
where
    S: Store + ?Sized,
{
    let inherited = match super_class(packages, store, class)? {
        Some(superclass) => instance_size(packages, store, superclass)?,
        None => 0,
    };

    inherited.checked_add(token as u16).ok_or(Exception::Security)
}

/// Virtual method dispatch: walk the class chain from `receiver_class`
/// until the public or package virtual-method table (selected by bit 7 of
/// `token`) covers the token, and return the method named at that slot.
pub fn virtual_method_target<S>(
    packages: &mut PackageTable,
    store: &S,
    receiver_class: ClassTarget,
    token: u8,
) -> Result<MethodTarget, Exception>
where
    S: Store + ?Sized,
{
    let package_visible = token & 0x80 != 0;
    let token = token & 0x7f;
    let mut cursor = Some(receiver_class);

    for _ in 0..MAX_CHAIN {
        let Some(current) = cursor else {
            return Err(Exception::Security);
        };

        packages.ensure(store, current.package)?;
        let info = class_info_of(packages, current)?;

        let (base, count) = if package_visible {
            (info.package_table_base()?, info.package_table_count()?)
        } else {
            (info.public_table_base()?, info.public_table_count()?)
        };

        if token >= base && token - base < count {
            let slot = token - base;
            let offset = if package_visible {
                info.package_method_offset(slot)?
            } else {
                info.public_method_offset(slot)?
            };

            if offset != 0 {
                return Ok(MethodTarget {
                    package: current.package,
                    offset,
                });
            }
        }

        cursor = super_class(packages, store, current)?;
    }

    Err(Exception::Security)
}

/// Interface dispatch: locate, on `receiver_class` or an ancestor, the
/// implemented-interface record for `interface`, remap the interface
/// method token to a class-local token, then dispatch virtually.
pub fn interface_method_target<S>(
    packages: &mut PackageTable,
    store: &S,
    receiver_class: ClassTarget,
    interface: ClassTarget,
    token: u8,
) -> Result<MethodTarget, Exception>
where
    S: Store + ?Sized,
{
    let mut cursor = Some(receiver_class);

    for _ in 0..MAX_CHAIN {
        let Some(current) = cursor else {
            return Err(Exception::Security);
        };

        packages.ensure(store, current.package)?;
        let count = class_info_of(packages, current)?.interface_count()?;

        for index in 0..count {
            let declared_ref = class_info_of(packages, current)?
                .implemented_interface(index)?
                .interface()?;
            let declared = resolve_class_ref(packages, store, current.package, declared_ref)?;

            if declared == interface {
                let local = class_info_of(packages, current)?
                    .implemented_interface(index)?
                    .remap(token)?;
                return virtual_method_target(packages, store, receiver_class, local);
            }
        }

        cursor = super_class(packages, store, current)?;
    }

    Err(Exception::Security)
}

/// Resolve a static-field reference of `from` to its declaring package and
/// static-image offset.
pub fn static_field_target<S>(
    packages: &mut PackageTable,
    store: &S,
    from: PackageId,
    static_ref: StaticRef,
) -> Result<StaticFieldTarget, Exception>
where
    S: Store + ?Sized,
{
    match static_ref {
        StaticRef::Internal(offset) => Ok(StaticFieldTarget {
            package: from,
            offset,
        }),
        StaticRef::External {
            package_token,
            class_token,
            member_token,
        } => {
            let package = import_package(packages, store, from, package_token)?;
            let offset = {
                let export = packages.ensure(store, package)?.export()?;
                export.class_export(class_token)?.static_field_offset(member_token)?
            };

            Ok(StaticFieldTarget { package, offset })
        }
    }
}

/// Resolve a static-method reference of `from` to its declaring package
/// and method-component offset.
pub fn static_method_target<S>(
    packages: &mut PackageTable,
    store: &S,
    from: PackageId,
    static_ref: StaticRef,
) -> Result<MethodTarget, Exception>
where
    S: Store + ?Sized,
{
    match static_ref {
        StaticRef::Internal(offset) => Ok(MethodTarget {
            package: from,
            offset,
        }),
        StaticRef::External {
            package_token,
            class_token,
            member_token,
        } => {
            let package = import_package(packages, store, from, package_token)?;
            let offset = {
                let export = packages.ensure(store, package)?.export()?;
                export.class_export(class_token)?.static_method_offset(member_token)?
            };

            Ok(MethodTarget { package, offset })
        }
    }
}

fn interface_reaches<S>(
    packages: &mut PackageTable,
    store: &S,
    from: ClassTarget,
    to: ClassTarget,
    depth: usize,
) -> Result<bool, Exception>
where
    S: Store + ?Sized,
{
    if from == to {
        return Ok(true);
    }
    if depth >= MAX_CHAIN {
        return Err(Exception::Security);
    }

    packages.ensure(store, from.package)?;
    let count = class_info_of(packages, from)?.as_interface()?.super_count()?;

    for index in 0..count {
        let super_ref = class_info_of(packages, from)?
            .as_interface()?
            .super_interface(index)?;
        let superinterface = resolve_class_ref(packages, store, from.package, super_ref)?;

        if interface_reaches(packages, store, superinterface, to, depth + 1)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn class_implements<S>(
    packages: &mut PackageTable,
    store: &S,
    class: ClassTarget,
    interface: ClassTarget,
) -> Result<bool, Exception>
where
    S: Store + ?Sized,
{
    let mut cursor = Some(class);

    for _ in 0..MAX_CHAIN {
        let Some(current) = cursor else {
            return Ok(false);
        };

        packages.ensure(store, current.package)?;
        let count = class_info_of(packages, current)?.interface_count()?;

        for index in 0..count {
            let declared_ref = class_info_of(packages, current)?
                .implemented_interface(index)?
                .interface()?;
            let declared = resolve_class_ref(packages, store, current.package, declared_ref)?;

            if declared == interface
                || interface_reaches(packages, store, declared, interface, 0)?
            {
                return Ok(true);
            }
        }

        cursor = super_class(packages, store, current)?;
    }

    Err(Exception::Security)
}

/// Whether `target` is the root class; arrays and interfaces are only
/// assignable to class targets that qualify.
pub fn assignable_to_root<S>(
    packages: &mut PackageTable,
    store: &S,
    target: ClassTarget,
) -> Result<bool, Exception>
where
    S: Store + ?Sized,
{
    packages.ensure(store, target.package)?;
    Ok(!class_info_of(packages, target)?.is_interface()?
        && class_info_of(packages, target)?.super_class()?.is_none())
}

/// Class/interface assignability: whether a value of type `source` may be
/// assigned to `target`.
pub fn assignable<S>(
    packages: &mut PackageTable,
    store: &S,
    source: ClassTarget,
    target: ClassTarget,
) -> Result<bool, Exception>
where
    S: Store + ?Sized,
{
    let source_is_interface = is_interface(packages, store, source)?;
    let target_is_interface = is_interface(packages, store, target)?;

    match (source_is_interface, target_is_interface) {
        (false, false) => {
            let mut cursor = Some(source);
            for _ in 0..MAX_CHAIN {
                let Some(current) = cursor else {
                    return Ok(false);
                };
                if current == target {
                    return Ok(true);
                }
                cursor = super_class(packages, store, current)?;
            }
            Err(Exception::Security)
        }
        (false, true) => class_implements(packages, store, source, target),
        (true, false) => assignable_to_root(packages, store, target),
        (true, true) => interface_reaches(packages, store, source, target, 0),
    }
}
