//! The C type graph, stored as an arena addressed by stable handles.
//!
//! Types reference each other freely (a struct contains a pointer to
//! itself, a base class links back to a derived class's layout), so
//! the graph is cyclic. Rather than reference-counted nodes, every
//! type lives in a [`TypeTable`] and is named by its [`TypeId`];
//! back-pointer caches are plain `Option<TypeId>` fields filled on
//! first use.

bitflags::bitflags! {
    /// Property flags on a type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        /// Integer type is unsigned
        const UNSIGNED = 0b0000_0001;
        /// Opaque forward declaration; length and fields are unknown
        const STUB = 0b0000_0010;
        /// Aggregate has a constructor
        const HAS_CTOR = 0b0000_0100;
        /// Aggregate has a destructor
        const HAS_DTOR = 0b0000_1000;
        /// Aggregate carries a vtable pointer (itself or via a base)
        const HAS_VTABLE = 0b0001_0000;
    }
}

/// Stable handle into a [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// The fundamental kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    Void,
    Int,
    Float,
    /// Pointer; `target` is the pointee
    Ptr,
    /// C++ reference; `target` is the referent
    Ref,
    /// Array; `target` is the element type
    Array,
    Struct,
    Union,
    Enum,
    /// Function; `target` is the return type
    Func,
    /// Pointer-to-data-member
    Member,
    /// Member function; `target` is the return type
    Method,
}

/// One data field of a struct or union.
///
/// Offsets and sizes are in bits so bit-fields need no special
/// representation: an ordinary field has `bitsize == 0` and occupies
/// the full length of its type.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub bitpos: u32,
    /// 0 means "not a bit-field": the field spans its type's length.
    pub bitsize: u32,
    pub ty: TypeId,
}

/// How a member function is reached at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Call through the object's vtable, slot index `slot`.
    Virtual { slot: u32 },
    /// Call the recorded code address directly.
    Direct { addr: u64 },
}

/// One member function of a struct.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    /// `TypeCode::Method` type carrying the signature
    pub ty: TypeId,
    pub dispatch: Dispatch,
}

/// A base class of a struct, at a byte offset within the derived
/// object. Single inheritance per level: the chain is walked outward
/// one base at a time.
#[derive(Debug, Clone)]
pub struct BaseClass {
    pub ty: TypeId,
    pub bitpos: u32,
}

/// A C type. Created once by the symbol reader; afterwards only the
/// `pointer_type` and `function_type` caches change.
#[derive(Debug, Clone)]
pub struct Type {
    pub code: TypeCode,
    pub name: Option<String>,
    /// Object size in bytes. 0 for void, functions and stubs.
    pub length: usize,
    /// Pointee, element or return type depending on `code`.
    pub target: Option<TypeId>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub bases: Vec<BaseClass>,
    /// Index into `fields` of the vtable pointer, when present.
    pub vptr_field: Option<usize>,
    pub flags: TypeFlags,
    /// Cache: the type "pointer to this type", filled lazily.
    pointer_type: Option<TypeId>,
    /// Cache: the type "function returning this type", filled lazily.
    function_type: Option<TypeId>,
    /// Signature parameter types for Func/Method types.
    pub params: Vec<TypeId>,
}

impl Type {
    fn new(code: TypeCode, name: Option<String>, length: usize) -> Self {
        Self {
            code,
            name,
            length,
            target: None,
            fields: Vec::new(),
            methods: Vec::new(),
            bases: Vec::new(),
            vptr_field: None,
            flags: TypeFlags::empty(),
            pointer_type: None,
            function_type: None,
            params: Vec::new(),
        }
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(TypeFlags::UNSIGNED)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.code, TypeCode::Struct | TypeCode::Union)
    }

    /// Integer-like for arithmetic purposes: int, enum, and their kin.
    pub fn is_integral(&self) -> bool {
        matches!(self.code, TypeCode::Int | TypeCode::Enum)
    }
}

/// The handles to the primitive C types of the target, registered once
/// into a fresh [`TypeTable`].
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub void: TypeId,
    pub char: TypeId,
    pub short: TypeId,
    pub int: TypeId,
    pub long: TypeId,
    pub long_long: TypeId,
    pub unsigned_char: TypeId,
    pub unsigned_short: TypeId,
    pub unsigned_int: TypeId,
    pub unsigned_long: TypeId,
    pub unsigned_long_long: TypeId,
    pub float: TypeId,
    pub double: TypeId,
}

/// Arena of types. All type construction and the cache fills go
/// through the table, so a `TypeId` is valid for the table's lifetime.
pub struct TypeTable {
    types: Vec<Type>,
    builtins: Builtins,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            // Placeholder until the real builtins are registered below.
            builtins: Builtins {
                void: TypeId(0),
                char: TypeId(0),
                short: TypeId(0),
                int: TypeId(0),
                long: TypeId(0),
                long_long: TypeId(0),
                unsigned_char: TypeId(0),
                unsigned_short: TypeId(0),
                unsigned_int: TypeId(0),
                unsigned_long: TypeId(0),
                unsigned_long_long: TypeId(0),
                float: TypeId(0),
                double: TypeId(0),
            },
        };
        table.builtins = Builtins {
            void: table.add(Type::new(TypeCode::Void, Some("void".into()), 0)),
            char: table.add_int("char", 1, false),
            short: table.add_int("short", 2, false),
            int: table.add_int("int", 4, false),
            long: table.add_int("long", 8, false),
            long_long: table.add_int("long long", 8, false),
            unsigned_char: table.add_int("unsigned char", 1, true),
            unsigned_short: table.add_int("unsigned short", 2, true),
            unsigned_int: table.add_int("unsigned int", 4, true),
            unsigned_long: table.add_int("unsigned long", 8, true),
            unsigned_long_long: table.add_int("unsigned long long", 8, true),
            float: table.add(Type::new(TypeCode::Float, Some("float".into()), 4)),
            double: table.add(Type::new(TypeCode::Float, Some("double".into()), 8)),
        };
        table
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    fn add(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    fn add_int(&mut self, name: &str, length: usize, unsigned: bool) -> TypeId {
        let mut ty = Type::new(TypeCode::Int, Some(name.into()), length);
        if unsigned {
            ty.flags |= TypeFlags::UNSIGNED;
        }
        self.add(ty)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    /// Register a freshly built type (used by symbol readers and tests).
    pub fn intern(&mut self, ty: Type) -> TypeId {
        self.add(ty)
    }

    /// Build a struct/union type from parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new_aggregate(
        &mut self,
        code: TypeCode,
        name: &str,
        length: usize,
        fields: Vec<Field>,
        methods: Vec<Method>,
        bases: Vec<BaseClass>,
        vptr_field: Option<usize>,
    ) -> TypeId {
        let mut ty = Type::new(code, Some(name.into()), length);
        ty.fields = fields;
        ty.methods = methods;
        ty.bases = bases;
        ty.vptr_field = vptr_field;
        if ty.vptr_field.is_some() {
            ty.flags |= TypeFlags::HAS_VTABLE;
        }
        self.add(ty)
    }

    /// Build an array type of `count` elements.
    pub fn new_array(&mut self, element: TypeId, count: usize) -> TypeId {
        let elem_len = self.get(element).length;
        let mut ty = Type::new(TypeCode::Array, None, elem_len * count);
        ty.target = Some(element);
        self.add(ty)
    }

    /// Build a function type with the given return and parameter types.
    pub fn new_function(&mut self, returns: TypeId, params: Vec<TypeId>) -> TypeId {
        let mut ty = Type::new(TypeCode::Func, None, 0);
        ty.target = Some(returns);
        ty.params = params;
        self.add(ty)
    }

    /// Build a method type (member function signature).
    pub fn new_method(&mut self, returns: TypeId, params: Vec<TypeId>) -> TypeId {
        let mut ty = Type::new(TypeCode::Method, None, 0);
        ty.target = Some(returns);
        ty.params = params;
        self.add(ty)
    }

    /// The type "pointer to `target`". Cached on the target type so
    /// repeated lookups return the same handle.
    pub fn pointer_to(&mut self, target: TypeId) -> TypeId {
        if let Some(cached) = self.get(target).pointer_type {
            return cached;
        }
        let mut ptr = Type::new(TypeCode::Ptr, None, 8);
        ptr.target = Some(target);
        let id = self.add(ptr);
        self.get_mut(target).pointer_type = Some(id);
        id
    }

    /// The type "function returning `target`", cached like `pointer_to`.
    pub fn function_returning(&mut self, target: TypeId) -> TypeId {
        if let Some(cached) = self.get(target).function_type {
            return cached;
        }
        let mut func = Type::new(TypeCode::Func, None, 0);
        func.target = Some(target);
        let id = self.add(func);
        self.get_mut(target).function_type = Some(id);
        id
    }

    /// Resolve Ref and Typedef-like wrappers down to the underlying type.
    pub fn strip_refs(&self, id: TypeId) -> TypeId {
        let mut id = id;
        while self.get(id).code == TypeCode::Ref {
            match self.get(id).target {
                Some(t) => id = t,
                None => break,
            }
        }
        id
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}
