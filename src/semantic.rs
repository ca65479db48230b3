//! Resolves declarations into types and symbols.
//!
//! Initializers are folded into constants where possible. Arithmetic and
//! comparison operators are not folded yet: [`execute_operator`] is the place
//! where that evaluation belongs.

use thiserror::Error;

use crate::{
    ast::{Ast, Constant, NodeId, NodeKind},
    diagnostics::{self, Coded, Severity},
    language::OperatorId,
    session::Session,
    symbols::{Function, SymbolId, SymbolKind, SymbolTable, Value, Variable},
    token::{Located, Location, Token},
    types::{self, Member, Resolved, TypeTable},
};

type Result<T, E = Located<Error>> = std::result::Result<T, E>;

/// Walks the program, filling `types` and `symbols`.
///
/// The first error stops the analysis. It is reported to the session and
/// returned.
pub fn analyze(
    session: &mut Session<'_>,
    tokens: &[Token],
    ast: &Ast,
    types: &mut TypeTable,
    symbols: &mut SymbolTable,
) -> Result<()> {
    let mut analyzer = Analyzer {
        session,
        tokens,
        ast,
        types,
        symbols,
    };
    let result = analyzer.items(ast.root());
    if let Err(error) = &result {
        analyzer.session.diagnostics.report_located(error);
    }
    result
}

/// Applies `op` to constant operands.
///
/// # Errors
///
/// Folding is not implemented for any operator yet, so this always returns
/// [`FoldError::NotImplemented`].
pub fn execute_operator(
    op: OperatorId,
    left: Option<Constant>,
    right: Option<Constant>,
) -> Result<Constant, FoldError> {
    _ = (left, right);
    Err(FoldError::NotImplemented(op))
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FoldError {
    #[error("folding of {0:?} is not implemented")]
    NotImplemented(OperatorId),
}

struct Analyzer<'a, 's, 'lang> {
    session: &'s mut Session<'lang>,
    tokens: &'a [Token],
    ast: &'a Ast,
    types: &'a mut TypeTable,
    symbols: &'a mut SymbolTable,
}

impl<'a> Analyzer<'a, '_, '_> {
    fn items(&mut self, parent: NodeId) -> Result<()> {
        for &node in self.branches(parent) {
            self.item(node)?;
        }
        Ok(())
    }

    fn item(&mut self, node: NodeId) -> Result<()> {
        match self.kind(node) {
            NodeKind::Typedef => self.typedef(node),
            NodeKind::Struct => self.structure(node).map(drop),
            NodeKind::VariableDeclaration => self.variable(node, None).map(drop),
            NodeKind::VariableDefinition => {
                let value = self.branch(node, 2);
                self.variable(node, Some(value)).map(drop)
            }
            NodeKind::FunctionDeclaration => self.function(node, false),
            NodeKind::FunctionDefinition => self.function(node, true),
            NodeKind::Layout(_) => self.layout(node),
            NodeKind::Body => {
                let loc = self.loc(node);
                let block = self.symbols.add("", SymbolKind::Block, loc);
                self.symbols.enter(block);
                let result = self.items(node);
                self.symbols.exit();
                result
            }
            NodeKind::Return => match self.ast.branch(node, 0) {
                Some(value) => self.expression(value),
                None => Ok(()),
            },
            kind if kind.is_control_flow() => Ok(()),
            _ => self.expression(node),
        }
    }

    fn typedef(&mut self, node: NodeId) -> Result<()> {
        let Resolved { ty, is_const } = self.resolve_type(self.branch(node, 0))?;
        let name = self.name(self.branch(node, 1));
        let at = self.loc_or_root(node);
        let alias = self
            .types
            .define_typedef(name, ty, is_const)
            .map_err(|error| at.wrap(Error::Type(error)))?;
        tracing::debug!(name, target = %alias.resolved(), "typedef");
        Ok(())
    }

    /// Registers a struct type and its symbol.
    fn structure(&mut self, node: NodeId) -> Result<types::Type> {
        let name_node = self.branch(node, 0);
        let name = self.name(name_node);
        let at = self.loc_or_root(name_node);

        let mut members: Vec<Member> = Vec::new();
        for &member in &self.branches(node)[1..] {
            let Resolved { ty, is_const } = self.resolve_type(self.branch(member, 0))?;
            let member_name = self.name(self.branch(member, 1));
            if members.iter().any(|m| &*m.name == member_name) {
                let loc = self.loc_or_root(member);
                return Err(loc.wrap(Error::Redefinition(member_name.to_owned())));
            }
            members.push(Member {
                name: member_name.into(),
                ty,
                is_const,
            });
        }

        let ty = self
            .types
            .define_struct(name, members)
            .map_err(|error| at.wrap(Error::Type(error)))?;
        self.declare(name, SymbolKind::Struct(ty.clone()), at)?;
        Ok(ty)
    }

    /// Declares the variable of a `VariableDeclaration` or
    /// `VariableDefinition` and folds its initializer.
    fn variable(&mut self, node: NodeId, value: Option<NodeId>) -> Result<SymbolId> {
        let Resolved { ty, is_const } = self.resolve_type(self.branch(node, 0))?;
        let name_node = self.branch(node, 1);
        let name = self.name(name_node);
        let at = self.loc_or_root(name_node);

        // The initializer cannot see the variable it initializes.
        let initial_value = value.map(|value| self.fold(value)).transpose()?;
        let variable = Variable {
            ty,
            is_const,
            modified: false,
            initial_value,
        };
        tracing::debug!(name, ty = %variable.ty, value = ?variable.initial_value, "variable");
        self.declare(name, SymbolKind::Variable(variable), at)
    }

    fn function(&mut self, node: NodeId, is_definition: bool) -> Result<()> {
        let Resolved { ty: return_type, .. } = self.resolve_type(self.branch(node, 0))?;
        let name_node = self.branch(node, 1);
        let name = self.name(name_node);
        let at = self.loc_or_root(name_node);

        let params: Vec<NodeId> = self.branches(node)[2..]
            .iter()
            .copied()
            .filter(|&b| *self.kind(b) == NodeKind::Parameter)
            .collect();
        let mut param_types = Vec::with_capacity(params.len());
        for &param in &params {
            param_types.push(self.resolve_type(self.branch(param, 0))?.ty);
        }

        let previous = match self.symbols.lookup(name) {
            Some((id, true)) => match &self.symbols.get(id).kind {
                SymbolKind::Function(f) if !(f.defined && is_definition) => Some(id),
                _ => return Err(at.wrap(Error::Redefinition(name.to_owned()))),
            },
            _ => None,
        };
        let function = match previous {
            Some(id) => {
                if let SymbolKind::Function(f) = &mut self.symbols.get_mut(id).kind {
                    f.defined |= is_definition;
                }
                id
            }
            None => {
                let function = Function {
                    return_type,
                    params: param_types,
                    defined: is_definition,
                };
                self.declare(name, SymbolKind::Function(function), at)?
            }
        };

        if !is_definition {
            return Ok(());
        }

        self.symbols.enter(function);
        let result = self.function_body(node, &params);
        self.symbols.exit();
        result
    }

    fn function_body(&mut self, node: NodeId, params: &[NodeId]) -> Result<()> {
        for &param in params {
            let Some(name_node) = self.ast.branch(param, 1) else {
                continue;
            };
            let Resolved { ty, is_const } = self.resolve_type(self.branch(param, 0))?;
            let variable = Variable {
                ty,
                is_const,
                modified: false,
                initial_value: None,
            };
            let name = self.name(name_node);
            let at = self.loc_or_root(name_node);
            self.declare(name, SymbolKind::Variable(variable), at)?;
        }
        match self.branches(node).last() {
            Some(&body) if *self.kind(body) == NodeKind::Body => self.items(body),
            _ => Ok(()),
        }
    }

    /// Declares what a layout binds. Qualifier expressions come first and
    /// are not inspected.
    fn layout(&mut self, node: NodeId) -> Result<()> {
        match self.branches(node) {
            [.., block, instance] if *self.kind(*block) == NodeKind::Struct => {
                let ty = self.structure(*block)?;
                let name = self.name(*instance);
                let variable = Variable {
                    ty,
                    is_const: false,
                    modified: false,
                    initial_value: None,
                };
                let at = self.loc_or_root(*instance);
                self.declare(name, SymbolKind::Variable(variable), at).map(drop)
            }
            [.., decl] if *self.kind(*decl) == NodeKind::VariableDeclaration => {
                self.variable(*decl, None).map(drop)
            }
            [.., sampler] => {
                tracing::debug!(name = self.name(*sampler), "sampler binding has no type");
                Ok(())
            }
            [] => Ok(()),
        }
    }

    /// Declares `name` in the current scope. Shadowing an outer symbol is a
    /// warning; a second symbol of the same name in one scope is an error.
    fn declare(&mut self, name: &str, kind: SymbolKind, at: Location) -> Result<SymbolId> {
        match self.symbols.lookup(name) {
            Some((_, true)) => return Err(at.wrap(Error::Redefinition(name.to_owned()))),
            Some((_, false)) => {
                let warning = Error::ShadowedSymbol(name.to_owned());
                self.session.diagnostics.report(at, &warning);
            }
            None => {}
        }
        Ok(self.symbols.add(name, kind, Some(at)))
    }

    /// Visits an expression statement, marking assigned variables as modified.
    fn expression(&mut self, node: NodeId) -> Result<()> {
        match self.kind(node) {
            NodeKind::Operator(op) => {
                let op = *op;
                if op.is_assignment() || op.is_increment_or_decrement() {
                    self.assign(self.branch(node, 0))?;
                }
                // The right side of `.` names a member, not a symbol.
                if op == OperatorId::Dot {
                    return self.expression(self.branch(node, 0));
                }
                for &branch in self.branches(node) {
                    self.expression(branch)?;
                }
                Ok(())
            }
            NodeKind::FunctionCall => {
                for &arg in &self.branches(node)[1..] {
                    self.expression(arg)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Checks the target of an assignment and marks it modified. Assigning
    /// to a member modifies the whole variable.
    fn assign(&mut self, mut target: NodeId) -> Result<()> {
        while *self.kind(target) == NodeKind::Operator(OperatorId::Dot) {
            target = self.branch(target, 0);
        }
        let at = self.loc_or_root(target);
        if *self.kind(target) != NodeKind::Variable {
            return Err(at.wrap(Error::InvalidAssignmentTarget));
        }
        let name = self.name(self.branch(target, 0));
        let Some((id, _)) = self.symbols.lookup(name) else {
            return Err(at.wrap(Error::UndeclaredIdentifier(name.to_owned())));
        };
        let Some(variable) = self.symbols.variable_mut(id) else {
            return Err(at.wrap(Error::NotAVariable(name.to_owned())));
        };
        if variable.is_const {
            return Err(at.wrap(Error::AssignToConst(name.to_owned())));
        }
        variable.modified = true;
        Ok(())
    }

    /// Evaluates an initializer as far as possible.
    fn fold(&mut self, node: NodeId) -> Result<Value> {
        match self.kind(node) {
            NodeKind::Constant(constant) => Ok(Value::Constant(*constant)),
            NodeKind::Variable => {
                let name = self.name(self.branch(node, 0));
                let at = self.loc_or_root(node);
                let Some((id, _)) = self.symbols.lookup(name) else {
                    return Err(at.wrap(Error::UndeclaredIdentifier(name.to_owned())));
                };
                let Some(variable) = self.symbols.variable(id) else {
                    return Err(at.wrap(Error::NotAVariable(name.to_owned())));
                };
                match variable.initial_value {
                    Some(Value::Constant(constant)) if !variable.modified => {
                        Ok(Value::Constant(constant))
                    }
                    _ => Ok(Value::Expr(node)),
                }
            }
            NodeKind::Operator(op) => {
                let op = *op;
                if op.is_assignment() || op.is_increment_or_decrement() {
                    self.expression(node)?;
                    return Ok(Value::Expr(node));
                }
                if op == OperatorId::Dot {
                    self.fold(self.branch(node, 0))?;
                    return Ok(Value::Expr(node));
                }
                let mut operands = Vec::with_capacity(2);
                for &branch in self.branches(node) {
                    operands.push(self.fold(branch)?);
                }
                let constant = |value: Option<&Value>| match value {
                    Some(Value::Constant(c)) => Some(*c),
                    _ => None,
                };
                let (left, right) = match operands.as_slice() {
                    [operand] => (None, constant(Some(operand))),
                    [left, right] => (constant(Some(left)), constant(Some(right))),
                    _ => return Ok(Value::Expr(node)),
                };
                let all_constant = operands.iter().all(|v| matches!(v, Value::Constant(_)));
                if !all_constant {
                    return Ok(Value::Expr(node));
                }
                match execute_operator(op, left, right) {
                    Ok(constant) => Ok(Value::Constant(constant)),
                    Err(error) => {
                        tracing::debug!(%error, "initializer kept unfolded");
                        Ok(Value::Expr(node))
                    }
                }
            }
            _ => {
                self.expression(node)?;
                Ok(Value::Expr(node))
            }
        }
    }

    fn resolve_type(&mut self, node: NodeId) -> Result<Resolved> {
        let NodeKind::Type(ids) = self.kind(node) else {
            let at = self.loc_or_root(node);
            return Err(at.wrap(Error::Type(types::Error::ExpectedType(String::new()))));
        };
        let at = self.loc_or_root(node);
        self.types
            .create_type(self.tokens, ids, at, &mut self.session.diagnostics)
            .map_err(|error| error.map(Error::Type))
    }

    fn kind(&self, node: NodeId) -> &'a NodeKind {
        let ast = self.ast;
        ast.kind(node)
    }

    fn branches(&self, node: NodeId) -> &'a [NodeId] {
        let ast = self.ast;
        ast.branches(node)
    }

    fn branch(&self, node: NodeId, n: usize) -> NodeId {
        // The parser always produces the documented branch layout.
        self.branches(node)[n]
    }

    fn name(&self, node: NodeId) -> &'a str {
        let ast = self.ast;
        ast.string(node).unwrap_or_default()
    }

    fn loc(&self, node: NodeId) -> Option<Location> {
        let token = self.ast.node(node).token?;
        self.tokens.get(token.index()).map(|t| t.loc)
    }

    /// The location of `node`, falling back to the first token of the input.
    fn loc_or_root(&mut self, node: NodeId) -> Location {
        match self.loc(node).or_else(|| self.tokens.first().map(|t| t.loc)) {
            Some(loc) => loc,
            None => Location::new(self.session.file("<input>"), 1, 1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Type(#[from] types::Error),
    #[error("`{0}` is already defined in this scope")]
    Redefinition(String),
    #[error("`{0}` shadows a symbol of an enclosing scope")]
    ShadowedSymbol(String),
    #[error("`{0}` is not declared")]
    UndeclaredIdentifier(String),
    #[error("`{0}` is not a variable")]
    NotAVariable(String),
    #[error("cannot assign to constant `{0}`")]
    AssignToConst(String),
    #[error("only variables can be assigned to")]
    InvalidAssignmentTarget,
}

impl Coded for Error {
    fn code(&self) -> u32 {
        match self {
            Error::Type(error) => error.code(),
            Error::Redefinition(_) => diagnostics::SEMANTIC | 8,
            Error::ShadowedSymbol(_) => diagnostics::SEMANTIC | 9,
            Error::UndeclaredIdentifier(_) => diagnostics::SEMANTIC | 10,
            Error::NotAVariable(_) => diagnostics::SEMANTIC | 11,
            Error::AssignToConst(_) => diagnostics::SEMANTIC | 12,
            Error::InvalidAssignmentTarget => diagnostics::SEMANTIC | 13,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Error::Type(error) => error.severity(),
            Error::ShadowedSymbol(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::tree_tests;
    use pretty_assertions::assert_eq;

    #[test]
    fn operators_are_not_folded_yet() {
        let result = execute_operator(
            OperatorId::Add,
            Some(Constant::Int(1)),
            Some(Constant::Int(2)),
        );
        assert_eq!(result, Err(FoldError::NotImplemented(OperatorId::Add)));
    }

    tree_tests!(
        use semantic;

        fn constants_fold_through_variables() {
            let program = "int a = 3; int b = a; int c = a + b;";
            let tree_ok = "
                variable a: int = int 3
                variable b: int = int 3
                variable c: int = <Add>
            ";
        }

        fn assignment_marks_modified() {
            let program = "int a = 3; a = 4; int b = a; int i = 0; i++;";
            let tree_ok = "
                variable a: int = int 3 (modified)
                variable b: int = <a>
                variable i: int = int 0 (modified)
            ";
        }

        fn member_reads_are_not_folded() {
            let program = "struct Light { float power; }; Light sun; float p = sun.power;";
            let tree_ok = "
                struct Light: Light
                variable sun: Light
                variable p: float = <Dot>
            ";
        }

        fn member_assignment_modifies_the_variable() {
            let program = "
                struct Light { vec3 color; };
                Light sun;
                sun.color.x = 1.0;
                float r = sun.color.x;
            ";
            let tree_ok = "
                struct Light: Light
                variable sun: Light (modified)
                variable r: float = <Dot>
            ";
        }

        fn const_members_cannot_be_assigned() {
            let program = "struct Light { float power; }; const Light sun; sun.power = 2.0;";
            let tree_error = "
                struct Light: Light
                variable sun: const Light
            ";
            let expected_errors = &[
                "test.horse -> 1:49 Error (0x1030c): cannot assign to constant `sun`",
            ];
        }

        fn inner_scope_shadows() {
            let program = "int x = 1; { int x = 2; }";
            let tree_error = "
                variable x: int = int 1
                block
                  variable x: int = int 2
            ";
            let expected_errors = &[
                "test.horse -> 1:18 Warning (0x10309): `x` shadows a symbol of an enclosing scope",
            ];
        }

        fn same_scope_redefinition() {
            let program = "int x; float x;";
            let tree_error = "
                variable x: int
            ";
            let expected_errors = &[
                "test.horse -> 1:14 Error (0x10308): `x` is already defined in this scope",
            ];
        }

        fn const_cannot_be_assigned() {
            let program = "const int k = 1; k = 2;";
            let tree_error = "
                variable k: const int = int 1
            ";
            let expected_errors = &[
                "test.horse -> 1:18 Error (0x1030c): cannot assign to constant `k`",
            ];
        }

        fn undeclared_identifier() {
            let program = "int a = b;";
            let tree_error = "";
            let expected_errors = &[
                "test.horse -> 1:9 Error (0x1030a): `b` is not declared",
            ];
        }

        fn functions_are_not_variables() {
            let program = "int f(); f = 1;";
            let tree_error = "
                function f(): int (declared)
            ";
            let expected_errors = &[
                "test.horse -> 1:10 Error (0x1030b): `f` is not a variable",
            ];
        }

        fn constants_are_not_assignable() {
            let program = "int a; 1 = a;";
            let tree_error = "
                variable a: int
            ";
            let expected_errors = &[
                "test.horse -> 1:8 Error (0x1030d): only variables can be assigned to",
            ];
        }

        fn declaration_then_definition() {
            let program = "
                float scale(float v, int);
                float scale(float v, int n) { float r = v; return r; }
                float s = scale(1.0, 2);
            ";
            let tree_ok = "
                function scale(float, int): float
                  variable v: float
                  variable n: int
                  variable r: float = <v>
                variable s: float = <scale>
            ";
        }

        fn typedefs_and_structs() {
            let program = "
                typedef const float scalar;
                struct Light { vec3 color; scalar power; };
                Light sun;
                scalar s = 1.0;
            ";
            let tree_ok = "
                struct Light: Light
                variable sun: Light
                variable s: const scalar = float 1.0
            ";
        }

        fn duplicate_qualifier_warns() {
            let program = "const const int x;";
            let tree_error = "
                variable x: const int
            ";
            let expected_errors = &[
                "test.horse -> 1:7 Warning (0x10304): duplicate `const` qualifier",
            ];
        }

        fn base_types_do_not_stack() {
            let program = "int float x;";
            let tree_error = "";
            let expected_errors = &[
                "test.horse -> 1:5 Error (0x10301): type `int` is followed by type `float`",
            ];
        }

        fn unknown_type() {
            let program = "color c;";
            let tree_error = "";
            let expected_errors = &[
                "test.horse -> 1:1 Error (0x10305): unknown type `color`",
            ];
        }

        fn layouts_declare_their_bindings() {
            let program = "
                layout(location = 0) in vec3 position;
                layout(binding = 0) UniformBuffer Camera { mat4 view; } camera;
                layout(binding = 1) Sampler2D albedo;
            ";
            let tree_ok = "
                variable position: vec3
                struct Camera_uniform_qwerty: Camera_uniform_qwerty
                variable camera: Camera_uniform_qwerty
            ";
        }
    );
}
