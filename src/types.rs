use std::{fmt, rc::Rc};

use thiserror::Error;

use crate::{
    ast::TokenId,
    diagnostics::{self, Coded, Diagnostics, Severity},
    language::Primitive,
    token::{Located, Location, Token, TokenKind},
};

/// A shared handle to an interned type. Two handles are equal only if they
/// point to the same table entry.
#[derive(Clone)]
pub struct Type(Rc<TypeInner>);

struct TypeInner {
    name: Box<str>,
    kind: TypeKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Float,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    Void,
    Scalar {
        kind: ScalarKind,
        bits: u8,
        signed: bool,
    },
    Vector {
        component: Type,
        len: u8,
    },
    Matrix {
        component: Type,
        columns: u8,
        rows: u8,
    },
    Struct {
        members: Vec<Member>,
    },
    TypeDef {
        target: Type,
        is_const: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub name: Box<str>,
    pub ty: Type,
    pub is_const: bool,
}

impl Type {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    /// Follows typedefs down to the aliased type.
    pub fn resolved(&self) -> &Type {
        let mut ty = self;
        while let TypeKind::TypeDef { target, .. } = ty.kind() {
            ty = target;
        }
        ty
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.resolved().kind(),
            TypeKind::Scalar {
                kind: ScalarKind::Int,
                ..
            }
        )
    }

    /// Named types are looked up by name; the others by structure.
    fn is_named(&self) -> bool {
        matches!(self.kind(), TypeKind::Struct { .. } | TypeKind::TypeDef { .. })
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A type resolved from a declaration, with the `const` qualifier kept apart
/// from the interned type.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub ty: Type,
    pub is_const: bool,
}

/// Every type of one compilation. Scalars, vectors and matrices are interned
/// by structure, so asking twice for `int` yields the same [`Type`].
#[derive(Debug, Default)]
pub struct TypeTable {
    types: Vec<Type>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.types.iter()
    }

    /// Looks up a struct or typedef by name.
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.iter().find(|ty| ty.is_named() && ty.name() == name)
    }

    fn intern(&mut self, name: String, kind: TypeKind) -> Type {
        if let Some(existing) = self.types.iter().find(|ty| *ty.kind() == kind) {
            return existing.clone();
        }
        let ty = Type(Rc::new(TypeInner {
            name: name.into(),
            kind,
        }));
        self.types.push(ty.clone());
        ty
    }

    pub fn void(&mut self) -> Type {
        self.intern("void".to_owned(), TypeKind::Void)
    }

    /// Interns an integer or float scalar. The sign of a float is ignored.
    pub fn scalar(&mut self, kind: ScalarKind, bits: u8, signed: bool) -> Type {
        let (name, signed) = match kind {
            ScalarKind::Float => ("float".to_owned(), true),
            ScalarKind::Int => {
                let base = match bits {
                    8 => "byte",
                    16 => "short",
                    _ => "int",
                };
                if signed {
                    (base.to_owned(), true)
                } else {
                    (format!("unsigned {base}"), false)
                }
            }
        };
        self.intern(name, TypeKind::Scalar { kind, bits, signed })
    }

    pub fn vector(&mut self, len: u8) -> Type {
        let component = self.scalar(ScalarKind::Float, 32, true);
        self.intern(format!("vec{len}"), TypeKind::Vector { component, len })
    }

    pub fn matrix(&mut self, columns: u8, rows: u8) -> Type {
        let component = self.scalar(ScalarKind::Float, 32, true);
        let name = if columns == rows {
            format!("mat{columns}")
        } else {
            format!("mat{columns}x{rows}")
        };
        self.intern(
            name,
            TypeKind::Matrix {
                component,
                columns,
                rows,
            },
        )
    }

    /// The type a primitive spelling stands for. `signed` defaults to true for
    /// integers. Qualifiers have no type of their own.
    pub fn primitive(&mut self, primitive: Primitive, signed: Option<bool>) -> Option<Type> {
        let signed = signed.unwrap_or(true);
        let ty = match primitive {
            Primitive::Void => self.void(),
            Primitive::Byte => self.scalar(ScalarKind::Int, 8, signed),
            Primitive::Short => self.scalar(ScalarKind::Int, 16, signed),
            Primitive::Int => self.scalar(ScalarKind::Int, 32, signed),
            Primitive::Float => self.scalar(ScalarKind::Float, 32, true),
            Primitive::Vec2 => self.vector(2),
            Primitive::Vec3 => self.vector(3),
            Primitive::Vec4 => self.vector(4),
            Primitive::Mat4 => self.matrix(4, 4),
            Primitive::Const | Primitive::Signed | Primitive::Unsigned => return None,
        };
        Some(ty)
    }

    pub fn define_struct(&mut self, name: &str, members: Vec<Member>) -> Result<Type, Error> {
        self.define(name, TypeKind::Struct { members })
    }

    pub fn define_typedef(&mut self, name: &str, target: Type, is_const: bool) -> Result<Type, Error> {
        self.define(name, TypeKind::TypeDef { target, is_const })
    }

    fn define(&mut self, name: &str, kind: TypeKind) -> Result<Type, Error> {
        if self.get(name).is_some() {
            return Err(Error::TypeRedefinition(name.to_owned()));
        }
        let ty = Type(Rc::new(TypeInner {
            name: name.into(),
            kind,
        }));
        self.types.push(ty.clone());
        Ok(ty)
    }

    /// Resolves the tokens of a type declaration, such as `const unsigned int`
    /// or the name of a typedef.
    ///
    /// `at` locates the declaration in case `ids` is empty. Repeated
    /// qualifiers are reported to `diagnostics` as warnings.
    pub fn create_type(
        &mut self,
        tokens: &[Token],
        ids: &[TokenId],
        at: Location,
        diagnostics: &mut Diagnostics,
    ) -> Result<Resolved, Located<Error>> {
        let mut is_const = false;
        let mut sign: Option<(bool, &Token)> = None;
        let mut base: Option<(Type, &Token)> = None;

        for id in ids {
            let token = &tokens[id.index()];
            let ty = match token.kind {
                TokenKind::Primitive(Primitive::Const) => {
                    if is_const {
                        diagnostics.report(token.loc, &Error::SameTypeQualifier(token.text.clone()));
                    }
                    is_const = true;
                    continue;
                }
                TokenKind::Primitive(p @ (Primitive::Signed | Primitive::Unsigned)) => {
                    let signed = p == Primitive::Signed;
                    match sign {
                        Some((previous, _)) if previous == signed => {
                            let warning = Error::SameTypeQualifier(token.text.clone());
                            diagnostics.report(token.loc, &warning);
                        }
                        Some(_) => return Err(token.loc.wrap(Error::SignedUnsignedExclusive)),
                        None => sign = Some((signed, token)),
                    }
                    continue;
                }
                TokenKind::Primitive(p) => match self.primitive(p, None) {
                    Some(ty) => ty,
                    None => continue,
                },
                TokenKind::Identifier => match self.get(&token.text) {
                    Some(ty) => ty.clone(),
                    None => return Err(token.loc.wrap(Error::UnknownType(token.text.clone()))),
                },
                _ => return Err(token.loc.wrap(Error::ExpectedType(token.text.clone()))),
            };

            if let Some((first, _)) = &base {
                let error = Error::TypeFollowedByType {
                    first: first.name().to_owned(),
                    second: ty.name().to_owned(),
                };
                return Err(token.loc.wrap(error));
            }
            base = Some((ty, token));
        }

        let Some((mut ty, base_token)) = base else {
            let loc = ids.first().map_or(at, |id| tokens[id.index()].loc);
            let found = ids
                .first()
                .map_or_else(String::new, |id| tokens[id.index()].text.clone());
            return Err(loc.wrap(Error::ExpectedType(found)));
        };

        if let TypeKind::TypeDef {
            is_const: true, ..
        } = ty.kind()
        {
            if is_const {
                let warning = Error::SameTypeQualifier("const".to_owned());
                diagnostics.report(base_token.loc, &warning);
            }
            is_const = true;
        }

        if let Some((signed, sign_token)) = sign {
            if !ty.is_integer() {
                let error = Error::SignNotAllowed {
                    qualifier: sign_token.text.clone(),
                    ty: ty.name().to_owned(),
                };
                return Err(sign_token.loc.wrap(error));
            }
            if let TypeKind::Scalar { kind, bits, .. } = *ty.resolved().kind() {
                ty = self.scalar(kind, bits, signed);
            }
        }

        Ok(Resolved { ty, is_const })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("type `{first}` is followed by type `{second}`")]
    TypeFollowedByType { first: String, second: String },
    #[error("`signed` and `unsigned` are mutually exclusive")]
    SignedUnsignedExclusive,
    #[error("`{qualifier}` is not allowed on type `{ty}`")]
    SignNotAllowed { qualifier: String, ty: String },
    #[error("duplicate `{0}` qualifier")]
    SameTypeQualifier(String),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("expected a type, found `{0}`")]
    ExpectedType(String),
    #[error("type `{0}` is already defined")]
    TypeRedefinition(String),
}

impl Coded for Error {
    fn code(&self) -> u32 {
        diagnostics::SEMANTIC
            | match self {
                Error::TypeFollowedByType { .. } => 1,
                Error::SignedUnsignedExclusive => 2,
                Error::SignNotAllowed { .. } => 3,
                Error::SameTypeQualifier(_) => 4,
                Error::UnknownType(_) => 5,
                Error::ExpectedType(_) => 6,
                Error::TypeRedefinition(_) => 7,
            }
    }

    fn severity(&self) -> Severity {
        match self {
            Error::SameTypeQualifier(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}
