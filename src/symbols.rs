use crate::{
    ast::{Constant, NodeId},
    token::Location,
    types::Type,
};

/// Index of a symbol in its [`SymbolTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: Box<str>,
    pub kind: SymbolKind,
    /// The scope the symbol was declared in. Only the root has none.
    pub parent: Option<SymbolId>,
    pub children: Vec<SymbolId>,
    pub loc: Option<Location>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolKind {
    Root,
    /// An anonymous `{ ... }` scope.
    Block,
    Variable(Variable),
    Function(Function),
    Struct(Type),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub ty: Type,
    pub is_const: bool,
    /// Set once the variable is the target of an assignment, which stops its
    /// initial value from being folded into later expressions.
    pub modified: bool,
    pub initial_value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub return_type: Type,
    pub params: Vec<Type>,
    pub defined: bool,
}

/// What an initializer evaluated to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Constant(Constant),
    /// Not foldable; the expression node is kept as is.
    Expr(NodeId),
}

/// The scope tree of one compilation.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    current: SymbolId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        let root = Symbol {
            name: "".into(),
            kind: SymbolKind::Root,
            parent: None,
            children: Vec::new(),
            loc: None,
        };
        SymbolTable {
            symbols: vec![root],
            current: SymbolId(0),
        }
    }

    pub fn root(&self) -> SymbolId {
        SymbolId(0)
    }

    pub fn current(&self) -> SymbolId {
        self.current
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn children(&self, id: SymbolId) -> &[SymbolId] {
        &self.symbols[id.index()].children
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.len() == 1
    }

    /// Declares a symbol in the current scope. Checking for redefinitions is
    /// up to the caller.
    pub fn add(&mut self, name: &str, kind: SymbolKind, loc: Option<Location>) -> SymbolId {
        let id = SymbolId(u32::try_from(self.symbols.len()).unwrap_or(u32::MAX));
        self.symbols.push(Symbol {
            name: name.into(),
            kind,
            parent: Some(self.current),
            children: Vec::new(),
            loc,
        });
        self.symbols[self.current.index()].children.push(id);
        id
    }

    /// Makes `scope` the current scope.
    pub fn enter(&mut self, scope: SymbolId) {
        debug_assert_eq!(self.get(scope).parent, Some(self.current), "not a child scope");
        self.current = scope;
    }

    /// Returns to the enclosing scope.
    pub fn exit(&mut self) {
        if let Some(parent) = self.get(self.current).parent {
            self.current = parent;
        }
    }

    /// Finds `name` from the current scope outwards. The flag tells whether
    /// the symbol lives in the current scope itself.
    pub fn lookup(&self, name: &str) -> Option<(SymbolId, bool)> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if let Some(found) = self.lookup_in(id, name) {
                return Some((found, id == self.current));
            }
            scope = self.get(id).parent;
        }
        None
    }

    /// Finds `name` among the direct children of `scope`.
    pub fn lookup_in(&self, scope: SymbolId, name: &str) -> Option<SymbolId> {
        self.children(scope)
            .iter()
            .copied()
            .find(|&child| !name.is_empty() && &*self.get(child).name == name)
    }

    pub fn variable(&self, id: SymbolId) -> Option<&Variable> {
        match &self.get(id).kind {
            SymbolKind::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self, id: SymbolId) -> Option<&mut Variable> {
        match &mut self.get_mut(id).kind {
            SymbolKind::Variable(variable) => Some(variable),
            _ => None,
        }
    }
}
