//! Mangling and demangling for the symbols through which compiled code
//! reaches the lazy runtime. The compiler emits calls to these names and the
//! JIT link layer routes the unresolved references to the stub materializer;
//! the textual forms below are therefore an ABI and must stay bit-stable.

use descriptors::{parse_field_type, parse_method_type, FieldType, MethodType};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MethodResolution {
    /// 5.4.3.3. Method Resolution from the JVM Spec.
    Virtual,
    /// 5.4.3.4. Interface Method Resolution from the JVM Spec.
    Interface,
    /// 6.5 'invokespecial': resolution against the named class directly.
    Special,
}

impl MethodResolution {
    fn prefix(self) -> &'static str {
        match self {
            MethodResolution::Virtual => "Virtual Call to ",
            MethodResolution::Interface => "Interface Call to ",
            MethodResolution::Special => "Special Call to ",
        }
    }
}

/// Mangling for calling a given Java method directly. No lookup or class
/// loading happens for these; the named method must exist in an already
/// loaded class. The call signature is the method descriptor with the
/// receiver prepended.
///
/// Syntax:
/// <direct-call> ::= <class-name> '.' <method-name> ':' <descriptor>
pub fn mangle_direct_method_call(class_name: &str, method_name: &str, descriptor: &MethodType) -> String {
    format!("{}.{}:{}", class_name, method_name, descriptor)
}

/// Mangling for a function returning either the address of a static field
/// (signature `() -> ptr`) or the offset of an instance field (signature
/// `() -> i64`); the caller knows which it is asking for.
///
/// Syntax:
/// <field-access> ::= <class-name> '.' <field-name> ':' <descriptor>
pub fn mangle_field_access(class_name: &str, field_name: &str, descriptor: &FieldType) -> String {
    format!("{}.{}:{}", class_name, field_name, descriptor)
}

/// Mangling for a function performing method resolution and then calling the
/// resolved method. The call signature is the method descriptor with the
/// receiver prepended.
///
/// Syntax:
/// <method-resolution-call> ::= <method-resolution> <direct-call>
/// <method-resolution> ::= 'Virtual Call to ' | 'Interface Call to ' | 'Special Call to '
pub fn mangle_method_resolution_call(
    resolution: MethodResolution,
    class_name: &str,
    method_name: &str,
    descriptor: &MethodType,
) -> String {
    format!("{}{}.{}:{}", resolution.prefix(), class_name, method_name, descriptor)
}

/// Mangling for a function performing static method resolution and then
/// calling the resolved method. The call signature matches the descriptor
/// exactly.
///
/// Syntax:
/// <static-call> ::= 'Static Call to ' <direct-call>
pub fn mangle_static_call(class_name: &str, method_name: &str, descriptor: &MethodType) -> String {
    format!("Static Call to {}.{}:{}", class_name, method_name, descriptor)
}

/// Mangling for a function returning a loaded class object, signature
/// `() -> ptr`. The `Initialized` token makes the variant that also runs
/// class initialization a distinct linker key.
///
/// Syntax:
/// <class-object-access> ::= 'Load ' ['Initialized '] <descriptor>
pub fn mangle_class_object_access(descriptor: &FieldType, must_initialize: bool) -> String {
    if must_initialize {
        format!("Load Initialized {}", descriptor)
    } else {
        format!("Load {}", descriptor)
    }
}

/// A call produced via `mangle_field_access`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DemangledFieldAccess<'a> {
    pub class_name: &'a str,
    pub field_name: &'a str,
    pub descriptor: FieldType<'a>,
}

/// A call produced via `mangle_method_resolution_call`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DemangledMethodResolutionCall<'a> {
    pub resolution: MethodResolution,
    pub class_name: &'a str,
    pub method_name: &'a str,
    pub descriptor: MethodType<'a>,
}

/// A call produced via `mangle_static_call`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DemangledStaticCall<'a> {
    pub class_name: &'a str,
    pub method_name: &'a str,
    pub descriptor: MethodType<'a>,
}

/// A call produced via `mangle_class_object_access`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DemangledClassObjectAccess<'a> {
    pub descriptor: FieldType<'a>,
    pub must_initialize: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DemangledVariant<'a> {
    /// The symbol is not the output of any of the mangling functions here.
    NotOurs,
    FieldAccess(DemangledFieldAccess<'a>),
    MethodResolutionCall(DemangledMethodResolutionCall<'a>),
    StaticCall(DemangledStaticCall<'a>),
    ClassObjectAccess(DemangledClassObjectAccess<'a>),
}

fn split_member_reference(symbol: &str) -> Option<(&str, &str, &str)> {
    // Binary class names contain '/' but never '.', and descriptors never
    // contain ':', so the first '.' and the last ':' split unambiguously.
    let (class_name, rest) = symbol.split_once('.')?;
    let (member_name, descriptor) = rest.rsplit_once(':')?;
    if class_name.is_empty() || member_name.is_empty() {
        return None;
    }
    Some((class_name, member_name, descriptor))
}

fn demangle_method_reference(
    resolution: MethodResolution,
    rest: &str,
) -> Option<DemangledMethodResolutionCall<'_>> {
    let (class_name, method_name, descriptor) = split_member_reference(rest)?;
    let descriptor = parse_method_type(descriptor).ok()?;
    Some(DemangledMethodResolutionCall { resolution, class_name, method_name, descriptor })
}

/// Attempts to demangle a symbol produced by any of the mangling functions
/// above, with the exception of `mangle_direct_method_call`: direct calls
/// name already-linked definitions and never drive materialization.
pub fn demangle_stub_symbol(symbol: &str) -> DemangledVariant<'_> {
    for resolution in [MethodResolution::Virtual, MethodResolution::Interface, MethodResolution::Special] {
        if let Some(rest) = symbol.strip_prefix(resolution.prefix()) {
            return match demangle_method_reference(resolution, rest) {
                Some(call) => DemangledVariant::MethodResolutionCall(call),
                None => DemangledVariant::NotOurs,
            };
        }
    }
    if let Some(rest) = symbol.strip_prefix("Static Call to ") {
        return match split_member_reference(rest)
            .and_then(|(class_name, method_name, descriptor)| {
                let descriptor = parse_method_type(descriptor).ok()?;
                Some(DemangledStaticCall { class_name, method_name, descriptor })
            }) {
            Some(call) => DemangledVariant::StaticCall(call),
            None => DemangledVariant::NotOurs,
        };
    }
    if let Some(rest) = symbol.strip_prefix("Load ") {
        let (rest, must_initialize) = match rest.strip_prefix("Initialized ") {
            Some(rest) => (rest, true),
            None => (rest, false),
        };
        return match parse_field_type(rest) {
            Ok(descriptor) => {
                DemangledVariant::ClassObjectAccess(DemangledClassObjectAccess { descriptor, must_initialize })
            }
            Err(_) => DemangledVariant::NotOurs,
        };
    }
    if let Some((class_name, field_name, descriptor)) = split_member_reference(symbol) {
        // A method descriptor here would be a direct call; those are not ours.
        if let Ok(descriptor) = parse_field_type(descriptor) {
            return DemangledVariant::FieldAccess(DemangledFieldAccess { class_name, field_name, descriptor });
        }
    }
    DemangledVariant::NotOurs
}
