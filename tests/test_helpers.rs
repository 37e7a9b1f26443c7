//! Synthetic package-image builder shared by the integration tests.

#![allow(dead_code)]

use card_vm::prelude::*;
use card_vm::storage::mark_package_present;

/// Tags of the eleven image components, in emission order.
const COMPONENT_TAGS: [u8; 11] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// An in-memory package image under construction.
#[derive(Debug, Default, Clone)]
pub struct ImageBuilder {
    aid: Vec<u8>,
    minor: u8,
    major: u8,
    cp: Vec<[u8; 4]>,
    classes: Vec<u8>,
    handlers: Vec<u8>,
    handler_count: u8,
    methods: Vec<u8>,
    exports: Vec<(u16, Vec<u16>, Vec<u16>)>,
    applets: Vec<(Vec<u8>, u16)>,
    imports: Vec<(Vec<u8>, u8, u8)>,
    static_image_size: u16,
}

impl ImageBuilder {
    pub fn new(aid: &[u8]) -> Self {
        Self {
            aid: aid.to_vec(),
            major: 1,
            ..Self::default()
        }
    }

    /// Append a method; returns its 1-based method-region offset.
    pub fn add_method(&mut self, max_stack: u8, nargs: u8, max_locals: u8, code: &[u8]) -> u16 {
        let offset = self.methods.len() as u16 + 1;

        if max_stack > 0x0f || nargs > 0x0f || max_locals > 0x0f {
            // extended header
            self.methods.push(0x80);
            self.methods.push(max_stack);
            self.methods.push(nargs);
            self.methods.push(max_locals);
        } else {
            self.methods.push(max_stack);
            self.methods.push(nargs << 4 | max_locals);
        }

        self.methods.extend_from_slice(code);
        offset
    }

    /// Append an abstract-flagged method header.
    pub fn add_abstract_method(&mut self) -> u16 {
        let offset = self.methods.len() as u16 + 1;
        self.methods.push(0x40); // abstract flag, short form
        self.methods.push(0x00);
        offset
    }

    /// Append an exception-handler entry covering
    /// `[start, start + length)`.
    pub fn add_handler(&mut self, start: u16, length: u16, handler: u16, catch_type: u16) {
        self.handlers.extend_from_slice(&start.to_be_bytes());
        self.handlers.extend_from_slice(&(length & 0x7fff).to_be_bytes());
        self.handlers.extend_from_slice(&handler.to_be_bytes());
        self.handlers.extend_from_slice(&catch_type.to_be_bytes());
        self.handler_count += 1;
    }

    /// Append a raw constant-pool entry; returns its pool offset.
    pub fn add_cp(&mut self, entry: [u8; 4]) -> u16 {
        self.cp.push(entry);
        self.cp.len() as u16 - 1
    }

    /// Constant-pool class reference to an internal class-info offset.
    pub fn add_cp_class(&mut self, class_offset: u16) -> u16 {
        let [hi, lo] = class_offset.to_be_bytes();
        self.add_cp([1, hi, lo, 0])
    }

    /// Constant-pool instance-field reference.
    pub fn add_cp_instance_field(&mut self, class_offset: u16, token: u8) -> u16 {
        let [hi, lo] = class_offset.to_be_bytes();
        self.add_cp([2, hi, lo, token])
    }

    /// Constant-pool virtual-method reference.
    pub fn add_cp_virtual_method(&mut self, class_offset: u16, token: u8) -> u16 {
        let [hi, lo] = class_offset.to_be_bytes();
        self.add_cp([3, hi, lo, token])
    }

    /// Constant-pool super-method reference.
    pub fn add_cp_super_method(&mut self, class_offset: u16, token: u8) -> u16 {
        let [hi, lo] = class_offset.to_be_bytes();
        self.add_cp([4, hi, lo, token])
    }

    /// Constant-pool internal static-field reference.
    pub fn add_cp_static_field(&mut self, image_offset: u16) -> u16 {
        let [hi, lo] = image_offset.to_be_bytes();
        self.add_cp([5, 0, hi, lo])
    }

    /// Constant-pool internal static-method reference.
    pub fn add_cp_static_method(&mut self, method_offset: u16) -> u16 {
        let [hi, lo] = method_offset.to_be_bytes();
        self.add_cp([6, 0, hi, lo])
    }

    /// Append a class-info record; returns its class-info offset.
    ///
    /// `vtables` are the (base, offsets) of the public and package
    /// virtual-method tables; `interfaces` maps an implemented interface
    /// (by class-info offset) to its token remap table.
    pub fn add_class(
        &mut self,
        super_class: Option<u16>,
        declared_instance_size: u8,
        public_table: (u8, &[u16]),
        package_table: (u8, &[u16]),
        interfaces: &[(u16, &[u8])],
    ) -> u16 {
        let offset = self.classes.len() as u16;

        self.classes.push(interfaces.len() as u8 & 0x0f);
        self.classes
            .extend_from_slice(&super_class.unwrap_or(0xffff).to_be_bytes());
        self.classes.push(declared_instance_size);
        self.classes.push(0); // first reference token
        self.classes.push(0); // reference count
        self.classes.push(public_table.0);
        self.classes.push(public_table.1.len() as u8);
        self.classes.push(package_table.0);
        self.classes.push(package_table.1.len() as u8);

        for entry in public_table.1.iter().chain(package_table.1) {
            self.classes.extend_from_slice(&entry.to_be_bytes());
        }

        for (interface, remap) in interfaces {
            self.classes.extend_from_slice(&interface.to_be_bytes());
            self.classes.push(remap.len() as u8);
            self.classes.extend_from_slice(remap);
        }

        offset
    }

    /// Append an interface-info record; returns its class-info offset.
    pub fn add_interface(&mut self, super_interfaces: &[u16]) -> u16 {
        let offset = self.classes.len() as u16;

        self.classes
            .push(0x80 | (super_interfaces.len() as u8 & 0x0f));
        for super_interface in super_interfaces {
            self.classes.extend_from_slice(&super_interface.to_be_bytes());
        }

        offset
    }

    /// Export a class with its static field and method offsets; class
    /// tokens are assigned in insertion order.
    pub fn export_class(&mut self, class_offset: u16, fields: &[u16], methods: &[u16]) -> u8 {
        self.exports
            .push((class_offset, fields.to_vec(), methods.to_vec()));
        self.exports.len() as u8 - 1
    }

    /// Declare an applet with its install-method offset.
    pub fn add_applet(&mut self, aid: &[u8], install_method: u16) -> u8 {
        self.applets.push((aid.to_vec(), install_method));
        self.applets.len() as u8 - 1
    }

    /// Declare an imported package.
    pub fn add_import(&mut self, aid: &[u8], major: u8, minor: u8) -> u8 {
        self.imports.push((aid.to_vec(), major, minor));
        self.imports.len() as u8 - 1
    }

    pub fn set_static_image_size(&mut self, size: u16) {
        self.static_image_size = size;
    }

    /// Assemble the eleven tagged, size-prefixed components.
    pub fn build(&self) -> Vec<u8> {
        let bodies = self.bodies();

        let mut image = Vec::new();
        for (tag, body) in COMPONENT_TAGS.iter().zip(&bodies) {
            image.push(*tag);
            image.extend_from_slice(&(body.len() as u16).to_be_bytes());
            image.extend_from_slice(body);
        }

        image
    }

    fn bodies(&self) -> Vec<Vec<u8>> {
        // header
        let mut header = Vec::new();
        header.extend_from_slice(&0xdecaffedu32.to_be_bytes());
        header.push(1); // format minor
        header.push(2); // format major
        header.push(0x01 | 0x02 | 0x04); // int + export + applet
        header.push(self.minor);
        header.push(self.major);
        header.push(self.aid.len() as u8);
        header.extend_from_slice(&self.aid);

        // applet
        let mut applet = vec![self.applets.len() as u8];
        for (aid, install) in &self.applets {
            applet.push(aid.len() as u8);
            applet.extend_from_slice(aid);
            applet.extend_from_slice(&install.to_be_bytes());
        }

        // import
        let mut import = vec![self.imports.len() as u8];
        for (aid, major, minor) in &self.imports {
            import.push(*minor);
            import.push(*major);
            import.push(aid.len() as u8);
            import.extend_from_slice(aid);
        }

        // constant pool
        let mut pool = Vec::new();
        pool.extend_from_slice(&(self.cp.len() as u16).to_be_bytes());
        for entry in &self.cp {
            pool.extend_from_slice(entry);
        }

        // method
        let mut method = vec![self.handler_count];
        method.extend_from_slice(&self.handlers);
        method.extend_from_slice(&self.methods);

        // export
        let mut export = vec![self.exports.len() as u8];
        for (class_offset, fields, methods) in &self.exports {
            export.extend_from_slice(&class_offset.to_be_bytes());
            export.push(fields.len() as u8);
            export.push(methods.len() as u8);
            for offset in fields.iter().chain(methods) {
                export.extend_from_slice(&offset.to_be_bytes());
            }
        }

        // directory
        let static_field = vec![0u8; self.static_image_size as usize];
        let mut directory = Vec::new();
        let sizes = [
            header.len(),
            31,
            applet.len(),
            import.len(),
            pool.len(),
            self.classes.len(),
            method.len(),
            static_field.len(),
            0,
            export.len(),
            0,
        ];
        for size in sizes {
            directory.extend_from_slice(&(size as u16).to_be_bytes());
        }
        directory.extend_from_slice(&self.static_image_size.to_be_bytes());
        directory.extend_from_slice(&0u16.to_be_bytes()); // array init count
        directory.extend_from_slice(&0u16.to_be_bytes()); // array init size
        directory.push(self.imports.len() as u8);
        directory.push(self.applets.len() as u8);
        directory.push(0); // custom count

        vec![
            header,
            directory,
            applet,
            import,
            pool,
            self.classes.clone(),
            method,
            static_field,
            Vec::new(),
            export,
            Vec::new(),
        ]
    }
}

/// Write the image into the store under `package` and mark the slot
/// populated.
pub fn install(store: &mut MemoryStorage, package: PackageId, image: &ImageBuilder) {
    store
        .write(&Tag::cap(package), &image.build())
        .expect("image install");
    mark_package_present(store, package).expect("bitmap update");
}

/// An interpreter over a single installed package.
pub fn vm_with(image: &ImageBuilder) -> Interpreter<MemoryStorage> {
    let mut store = MemoryStorage::new();
    install(&mut store, 0, image);
    Interpreter::new(store)
}

pub const TEST_AID: &[u8] = &[0xa0, 0x00, 0x00, 0x06, 0x15];
pub const APPLET: AppletId = 1;

/// Run `code` as an exported static method of a fresh single-package
/// image.
pub fn run_program(
    max_stack: u8,
    max_locals: u8,
    code: &[u8],
) -> Result<ReturnValue, VmError> {
    let mut image = ImageBuilder::new(TEST_AID);
    let main = image.add_method(max_stack, 0, max_locals, code);
    image.export_class(0, &[], &[main]);

    vm_with(&image).run(APPLET, 0, 0, 0, true)
}

/// Shorthand for programs without locals.
pub fn run_short(code: &[u8]) -> Result<ReturnValue, VmError> {
    run_program(4, 0, code)
}

/// Assert a finished run returning the given short.
pub fn assert_returns_short(code: &[u8], expected: i16) {
    assert_eq!(run_short(code), Ok(ReturnValue::Short(expected)));
}

/// Assert a run terminating with the given uncaught exception kind.
pub fn assert_uncaught(code: &[u8], expected: Exception) {
    match run_short(code) {
        Err(VmError::Uncaught(e)) => assert_eq!(e, expected),
        other => panic!("expected uncaught {expected}, got {other:?}"),
    }
}
