//! Managed type descriptors
//!
//! Design: a `TypeDescriptor` is a cheap-clone structural key. The projection
//! layer never introspects managed types at run time; everything it needs to
//! know (shape, generic arguments, projected attribute) is carried here, and
//! everything else is asked of the `TypeMetadata` collaborator.

use super::guid::{iids, Guid, GuidGenerator};
use std::fmt;
use std::sync::Arc;

/// Primitive value types with a fixed ABI representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Primitive {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    Char16,
    Guid,
    DateTime,
    TimeSpan,
}

impl Primitive {
    pub const ALL: [Primitive; 15] = [
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Bool,
        Self::Char16,
        Self::Guid,
        Self::DateTime,
        Self::TimeSpan,
    ];

    /// Name used in run-time class names
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::I8 => "Int8",
            Self::U8 => "UInt8",
            Self::I16 => "Int16",
            Self::U16 => "UInt16",
            Self::I32 => "Int32",
            Self::U32 => "UInt32",
            Self::I64 => "Int64",
            Self::U64 => "UInt64",
            Self::F32 => "Single",
            Self::F64 => "Double",
            Self::Bool => "Boolean",
            Self::Char16 => "Char16",
            Self::Guid => "Guid",
            Self::DateTime => "Windows.Foundation.DateTime",
            Self::TimeSpan => "Windows.Foundation.TimeSpan",
        }
    }

    /// Type signature fragment used for parameterized identifiers
    pub const fn signature(self) -> &'static str {
        match self {
            Self::I8 => "i1",
            Self::U8 => "u1",
            Self::I16 => "i2",
            Self::U16 => "u2",
            Self::I32 => "i4",
            Self::U32 => "u4",
            Self::I64 => "i8",
            Self::U64 => "u8",
            Self::F32 => "f4",
            Self::F64 => "f8",
            Self::Bool => "b1",
            Self::Char16 => "c2",
            Self::Guid => "g16",
            Self::DateTime => "struct(Windows.Foundation.DateTime;i8)",
            Self::TimeSpan => "struct(Windows.Foundation.TimeSpan;i8)",
        }
    }

    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.class_name() == name)
    }
}

/// UTF-16 code unit carried as a distinct primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Char16(pub u16);

/// Ticks (100ns) since 1601-01-01 UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct DateTime(pub i64);

/// Duration in ticks (100ns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct TimeSpan(pub i64);

/// Rust types that map one-to-one onto an ABI primitive
pub trait AbiPrimitive: Copy + Default + fmt::Debug + Send + Sync + 'static {
    const KIND: Primitive;
}

macro_rules! abi_primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl AbiPrimitive for $ty {
            const KIND: Primitive = Primitive::$kind;
        })*
    };
}

abi_primitive! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    Char16 => Char16,
    Guid => Guid,
    DateTime => DateTime,
    TimeSpan => TimeSpan,
}

/// Shape of a managed type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The root object type
    Object,
    String,
    /// Reference to a type (`System.Type` / `TypeName`)
    TypeName,
    Primitive(Primitive),
    Struct,
    Enum,
    Delegate,
    Class,
    Interface,
    /// Key/value pair; arguments are `[key, value]`
    KeyValuePair,
    /// `Nullable<T>`; argument is `T`
    Nullable,
    /// ABI helper for a boxed delegate; argument is the delegate
    NullableDelegate,
    /// ABI shape of a boxed array; argument is the element type
    ReferenceArray,
    Array { rank: u32, zero_based: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeData {
    name: String,
    kind: TypeKind,
    args: Vec<TypeDescriptor>,
    projected: bool,
}

/// Logical managed type, compared structurally
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor(Arc<TypeData>);

const IREFERENCE: &str = "Windows.Foundation.IReference`1";
const IREFERENCE_ARRAY: &str = "Windows.Foundation.IReferenceArray`1";
const IKEY_VALUE_PAIR: &str = "Windows.Foundation.Collections.IKeyValuePair`2";

impl TypeDescriptor {
    fn new(name: impl Into<String>, kind: TypeKind, args: Vec<TypeDescriptor>, projected: bool) -> Self {
        Self(Arc::new(TypeData {
            name: name.into(),
            kind,
            args,
            projected,
        }))
    }

    pub fn object() -> Self {
        Self::new("Object", TypeKind::Object, Vec::new(), true)
    }

    pub fn string() -> Self {
        Self::new("String", TypeKind::String, Vec::new(), true)
    }

    pub fn type_name() -> Self {
        Self::new("Windows.UI.Xaml.Interop.TypeName", TypeKind::TypeName, Vec::new(), true)
    }

    pub fn primitive(primitive: Primitive) -> Self {
        Self::new(primitive.class_name(), TypeKind::Primitive(primitive), Vec::new(), true)
    }

    pub fn of<T: AbiPrimitive>() -> Self {
        Self::primitive(T::KIND)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Struct, Vec::new(), false)
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Enum, Vec::new(), false)
    }

    pub fn delegate(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Delegate, Vec::new(), false)
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class, Vec::new(), false)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface, Vec::new(), false)
    }

    pub fn key_value_pair(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::new(IKEY_VALUE_PAIR, TypeKind::KeyValuePair, vec![key, value], true)
    }

    pub fn nullable(inner: TypeDescriptor) -> Self {
        Self::new(IREFERENCE, TypeKind::Nullable, vec![inner], true)
    }

    pub fn nullable_delegate(delegate: TypeDescriptor) -> Self {
        Self::new(IREFERENCE, TypeKind::NullableDelegate, vec![delegate], true)
    }

    pub fn reference_array(element: TypeDescriptor) -> Self {
        Self::new(IREFERENCE_ARRAY, TypeKind::ReferenceArray, vec![element], true)
    }

    /// Single-dimensional, zero-based array
    pub fn array(element: TypeDescriptor) -> Self {
        Self::array_with_shape(element, 1, true)
    }

    pub fn array_with_shape(element: TypeDescriptor, rank: u32, zero_based: bool) -> Self {
        let name = format!("{}[{}]", element, ",".repeat(rank.saturating_sub(1) as usize));
        Self::new(name, TypeKind::Array { rank, zero_based }, vec![element], false)
    }

    /// Same type marked as belonging to the projected object model
    pub fn projected(self) -> Self {
        let mut data = (*self.0).clone();
        data.projected = true;
        Self(Arc::new(data))
    }

    /// Instantiate a generic definition with concrete arguments
    pub fn with_args(self, args: Vec<TypeDescriptor>) -> Self {
        let mut data = (*self.0).clone();
        data.args = args;
        Self(Arc::new(data))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    #[inline]
    pub fn args(&self) -> &[TypeDescriptor] {
        &self.0.args
    }

    #[inline]
    pub fn is_projected(&self) -> bool {
        self.0.projected
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind(), TypeKind::Object)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind(), TypeKind::String)
    }

    pub fn is_type_name(&self) -> bool {
        matches!(self.kind(), TypeKind::TypeName)
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self.kind(), TypeKind::Delegate)
    }

    pub fn is_key_value_pair(&self) -> bool {
        matches!(self.kind(), TypeKind::KeyValuePair)
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.kind() {
            TypeKind::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.as_primitive().is_some()
    }

    pub fn is_value_type(&self) -> bool {
        matches!(
            self.kind(),
            TypeKind::Primitive(_)
                | TypeKind::Struct
                | TypeKind::Enum
                | TypeKind::KeyValuePair
                | TypeKind::Nullable
        )
    }

    /// Generic instantiation with at least one argument (arrays excluded)
    pub fn is_constructed_generic(&self) -> bool {
        !self.args().is_empty() && !matches!(self.kind(), TypeKind::Array { .. })
    }

    pub fn generic_definition(&self) -> Option<&str> {
        self.is_constructed_generic().then(|| self.name())
    }

    /// `T` of a `Nullable<T>`
    pub fn nullable_underlying(&self) -> Option<&TypeDescriptor> {
        match self.kind() {
            TypeKind::Nullable => self.args().first(),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&TypeDescriptor> {
        match self.kind() {
            TypeKind::Array { .. } | TypeKind::ReferenceArray => self.args().first(),
            _ => None,
        }
    }

    /// Single-dimensional, zero-based and not jagged
    pub fn is_sz_array(&self) -> bool {
        match self.kind() {
            TypeKind::Array { rank: 1, zero_based: true } => self
                .element_type()
                .map_or(false, |e| !matches!(e.kind(), TypeKind::Array { .. })),
            _ => false,
        }
    }

    /// Signature fragment fed to `GuidGenerator`
    pub fn signature(&self) -> String {
        let args = || -> Vec<String> { self.args().iter().map(|a| a.signature()).collect() };
        match self.kind() {
            TypeKind::Object => "cinterface(IInspectable)".to_string(),
            TypeKind::String => "string".to_string(),
            TypeKind::TypeName => {
                "struct(Windows.UI.Xaml.Interop.TypeName;string;enum(Windows.UI.Xaml.Interop.TypeKind;i4))"
                    .to_string()
            }
            TypeKind::Primitive(p) => p.signature().to_string(),
            TypeKind::Struct => format!("struct({})", self.name()),
            TypeKind::Enum => format!("enum({};i4)", self.name()),
            TypeKind::Delegate => generic_signature("delegate", self.name(), &args()),
            TypeKind::Class => format!("rc({})", self.name()),
            TypeKind::Interface => generic_signature("interface", self.name(), &args()),
            TypeKind::KeyValuePair => {
                parameterized_signature(&iids::PINTERFACE_IKEY_VALUE_PAIR, &args())
            }
            TypeKind::Nullable | TypeKind::NullableDelegate => {
                parameterized_signature(&iids::PINTERFACE_IREFERENCE, &args())
            }
            TypeKind::ReferenceArray => {
                parameterized_signature(&iids::PINTERFACE_IREFERENCE_ARRAY, &args())
            }
            TypeKind::Array { .. } => format!("array({})", args().join(";")),
        }
    }

    /// Run-time class name used when the type is boxed for native consumers
    pub fn boxed_name(&self) -> String {
        match self.kind() {
            TypeKind::Primitive(_)
            | TypeKind::Struct
            | TypeKind::Enum
            | TypeKind::String
            | TypeKind::TypeName
            | TypeKind::KeyValuePair => format!("{}<{}>", IREFERENCE, self),
            TypeKind::Delegate if !self.is_constructed_generic() => {
                format!("{}<{}>", IREFERENCE, self)
            }
            TypeKind::Array { .. } if self.is_sz_array() => match self.element_type() {
                Some(element) => format!("{}<{}>", IREFERENCE_ARRAY, element),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// Parameterized identifier derived from this type's signature
    pub fn parameterized_iid(&self) -> Guid {
        GuidGenerator::from_signature(&self.signature())
    }
}

fn generic_signature(prefix: &str, name: &str, args: &[String]) -> String {
    if args.is_empty() {
        format!("{}({})", prefix, name)
    } else {
        format!("{}({};{})", prefix, name, args.join(";"))
    }
}

fn parameterized_signature(definition: &Guid, args: &[String]) -> String {
    let mut signature = format!("pinterface({{{}}}", definition);
    for arg in args {
        signature.push(';');
        signature.push_str(arg);
    }
    signature.push(')');
    signature
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.kind(), TypeKind::Array { .. }) || self.args().is_empty() {
            return f.write_str(self.name());
        }
        write!(f, "{}<", self.name())?;
        for (i, arg) in self.args().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(">")
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = TypeDescriptor::interface("Demo.IThing").projected();
        let b = TypeDescriptor::interface("Demo.IThing").projected();
        assert_eq!(a, b);
        assert_ne!(a, TypeDescriptor::interface("Demo.IThing"));
    }

    #[test]
    fn test_sz_array_detection() {
        let int = TypeDescriptor::of::<i32>();
        assert!(TypeDescriptor::array(int.clone()).is_sz_array());
        assert!(!TypeDescriptor::array_with_shape(int.clone(), 2, true).is_sz_array());
        assert!(!TypeDescriptor::array_with_shape(int.clone(), 1, false).is_sz_array());

        let jagged = TypeDescriptor::array(TypeDescriptor::array(int));
        assert!(!jagged.is_sz_array());
    }

    #[test]
    fn test_boxed_names() {
        assert_eq!(
            TypeDescriptor::of::<i32>().boxed_name(),
            "Windows.Foundation.IReference`1<Int32>"
        );
        assert_eq!(
            TypeDescriptor::string().boxed_name(),
            "Windows.Foundation.IReference`1<String>"
        );
        assert_eq!(
            TypeDescriptor::array(TypeDescriptor::of::<u8>()).boxed_name(),
            "Windows.Foundation.IReferenceArray`1<UInt8>"
        );
        assert_eq!(TypeDescriptor::class("Demo.Widget").boxed_name(), "Demo.Widget");
    }

    #[test]
    fn test_generic_display() {
        let pair = TypeDescriptor::key_value_pair(TypeDescriptor::string(), TypeDescriptor::of::<i32>());
        assert_eq!(
            pair.to_string(),
            "Windows.Foundation.Collections.IKeyValuePair`2<String, Int32>"
        );
        assert_eq!(pair.generic_definition(), Some("Windows.Foundation.Collections.IKeyValuePair`2"));
        assert!(pair.is_value_type());
    }
}
