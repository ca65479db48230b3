// program     ::= item*
// item        ::= typedef | struct | layout | function | variable | statement
// typedef     ::= 'typedef' type NAME ';'
// struct      ::= 'struct' NAME '{' (type NAME ';')* '}' ';'
// layout      ::= 'layout' '(' expr (',' expr)* ')' layout-kind layout-body
// layout-kind ::= 'in' | 'out' | 'UniformBuffer' | 'Sampler1D' | 'Sampler2D' | 'Sampler3D'
// layout-body ::= type NAME ';'
//               | NAME '{' (type NAME ';')* '}' [NAME] ';'
//               | NAME ';'
// function    ::= type NAME '(' [param (',' param)*] ')' (';' | '{' item* '}')
// param       ::= type [NAME]
// variable    ::= type NAME ['=' expr] ';'
// statement   ::= 'return' [expr] ';' | '{' item* '}' | expr ';'
// type        ::= (PRIMITIVE | NAME)+
//
// Expressions are flat runs of operands and operators, bound by the
// precedence and associativity in the language table.
//
// Branch layout per node kind:
//
// VariableDeclaration  [Type, String]
// VariableDefinition   [Type, String, expr]
// FunctionDeclaration  [Type, String, Parameter*]
// FunctionDefinition   [Type, String, Parameter*, Body]
// Parameter            [Type, String?]
// Body                 [item*]
// Return               [expr?]
// Struct               [String, VariableDeclaration*]
// Typedef              [Type, String]
// Layout               [expr+, VariableDeclaration | Struct String | String]
// Variable             [String]
// FunctionCall         [String, expr*]
// Operator             [left?, right?]

use std::fmt;

use crate::language::OperatorId;

/// Index of a node in its [`Ast`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a token in the buffer the tree was parsed from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl TokenId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Root,
    VariableDeclaration,
    VariableDefinition,
    FunctionDeclaration,
    FunctionDefinition,
    Parameter,
    Body,
    If,
    Else,
    For,
    While,
    Switch,
    Return,
    Constant(Constant),
    Variable,
    FunctionCall,
    Operator(OperatorId),
    /// An identifier.
    String(Box<str>),
    /// The tokens spelling a type, qualifiers included.
    Type(Vec<TokenId>),
    Struct,
    Typedef,
    Layout(LayoutKind),
}

impl NodeKind {
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            NodeKind::If | NodeKind::Else | NodeKind::For | NodeKind::While | NodeKind::Switch
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Constant {
    Int(u64),
    Float(f64),
    Byte(u8),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "int {v}"),
            Constant::Float(v) => write!(f, "float {v:?}"),
            Constant::Byte(v) => write!(f, "byte {v}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    In,
    Out,
    UniformBuffer,
    Sampler1D,
    Sampler2D,
    Sampler3D,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub branches: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// The token the node was created from, for diagnostics.
    pub token: Option<TokenId>,
}

/// Arena of nodes. Node `0` is always the root.
#[derive(Clone, Debug, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Default for Ast {
    fn default() -> Self {
        Ast::new()
    }
}

impl Ast {
    pub fn new() -> Ast {
        let mut ast = Ast {
            nodes: Vec::with_capacity(256),
        };
        ast.add(NodeKind::Root, None);
        ast
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Creates a node with no parent.
    pub fn add(&mut self, kind: NodeKind, token: Option<TokenId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node {
            kind,
            branches: Vec::new(),
            parent: None,
            token,
        });
        id
    }

    /// Appends `child` to the branches of `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.index()].parent.is_none(), "node attached twice");
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].branches.push(child);
    }

    /// Creates a node as the last branch of `parent`.
    pub fn push(&mut self, parent: NodeId, kind: NodeKind, token: Option<TokenId>) -> NodeId {
        let id = self.add(kind, token);
        self.attach(parent, id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn branches(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].branches
    }

    pub fn branch(&self, id: NodeId, n: usize) -> Option<NodeId> {
        self.branches(id).get(n).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// The identifier of a `String` node.
    pub fn string(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn attach_links_both_ways() {
        let mut ast = Ast::new();
        let def = ast.push(ast.root(), NodeKind::VariableDefinition, None);
        let name = ast.add(NodeKind::String("x".into()), Some(TokenId(1)));
        ast.attach(def, name);

        assert_eq!(ast.branches(ast.root()), [def]);
        assert_eq!(ast.parent(name), Some(def));
        assert_eq!(ast.string(name), Some("x"));
        assert_eq!(ast.branch(def, 1), None);
        assert_eq!(ast.len(), 3);
    }
}
