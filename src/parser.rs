use thiserror::Error;

use crate::{
    ast::{Ast, Constant, LayoutKind, NodeId, NodeKind, TokenId},
    diagnostics::{self, Coded, Severity},
    language::{Keyword, Language, OperatorDef, OperatorId, Punct},
    session::Session,
    token::{LiteralKind, Located, Location, Token, TokenKind},
};

type Result<T, E = Located<Error>> = std::result::Result<T, E>;

/// Blocks, parentheses and skipped statements may nest this deep. Operator
/// trees may not grow taller than this either.
pub const MAX_DEPTH: u32 = 256;

/// Suffix given to the struct behind an inline uniform block, so it does not
/// collide with a struct of the same name.
pub const UNIFORM_STRUCT_SUFFIX: &str = "_uniform_qwerty";

/// Parses a whole program.
///
/// The first syntax error stops the parse. It is reported to the session and
/// returned.
pub fn parse(session: &mut Session<'_>, tokens: &[Token]) -> Result<Ast> {
    let mut p = Parser::new(session, tokens);
    let root = p.ast.root();
    p.parse_block(root, None)?;
    Ok(p.ast)
}

/// Parses a single expression, optionally followed by `;`.
pub fn parse_expr(session: &mut Session<'_>, tokens: &[Token]) -> Result<(Ast, NodeId)> {
    let mut p = Parser::new(session, tokens);
    let expr = p.parse_expression(&[Punct::Semicolon])?;
    p.take_punct(Punct::Semicolon);
    if let Some(token) = p.peek() {
        return Err(p.unexpected(token, "end of input"));
    }
    let root = p.ast.root();
    p.ast.attach(root, expr);
    Ok((p.ast, expr))
}

/// An operator waiting on the stack for its right operand.
type Pending<'lang> = (NodeId, &'lang OperatorDef, Location);

struct Parser<'t, 's, 'lang> {
    session: &'s mut Session<'lang>,
    lang: &'lang Language,
    tokens: &'t [Token],
    cursor: usize,
    ast: Ast,
    depth: u32,
    /// Names introduced by `struct` and `typedef`.
    type_names: Vec<String>,
}

impl<'t, 's, 'lang> Parser<'t, 's, 'lang> {
    fn new(session: &'s mut Session<'lang>, tokens: &'t [Token]) -> Self {
        Parser {
            lang: session.lang,
            session,
            tokens,
            cursor: 0,
            ast: Ast::new(),
            depth: 0,
            type_names: Vec::new(),
        }
    }

    /// Parses items into `parent` until the end of input or, when `open` is
    /// the location of a `{`, until the matching `}`.
    fn parse_block(&mut self, parent: NodeId, open: Option<Location>) -> Result<()> {
        loop {
            let Some(token) = self.peek() else {
                return match open {
                    Some(_) => Err(self.eof("`}`")),
                    None => Ok(()),
                };
            };
            match token.kind {
                TokenKind::Punct(Punct::RBrace) => {
                    if open.is_none() {
                        return Err(self.unexpected(token, "a declaration"));
                    }
                    self.advance();
                    return Ok(());
                }
                TokenKind::Punct(Punct::Semicolon) => {
                    self.advance();
                }
                TokenKind::Punct(Punct::LBrace) => {
                    let body = self.push(parent, NodeKind::Body);
                    self.advance();
                    self.nested(token.loc, |p| p.parse_block(body, Some(token.loc)))?;
                }
                TokenKind::Keyword(keyword) => self.parse_keyword(parent, keyword)?,
                _ => self.parse_statement(parent)?,
            }
        }
    }

    fn parse_keyword(&mut self, parent: NodeId, keyword: Keyword) -> Result<()> {
        match keyword {
            Keyword::Typedef => self.parse_typedef(parent),
            Keyword::Struct => self.parse_struct(parent),
            Keyword::Layout => self.parse_layout(parent),
            Keyword::Return => self.parse_return(parent),
            Keyword::If | Keyword::Else | Keyword::For | Keyword::While | Keyword::Switch => {
                self.skip_control_flow(parent, keyword)
            }
            Keyword::Extern => {
                self.advance();
                self.parse_statement(parent)
            }
            _ => {
                let token = self.current()?;
                Err(self.unexpected(token, "a declaration"))
            }
        }
    }

    /// A declaration (variable or function) or an expression statement. It is
    /// a declaration when a run of type tokens ends in a name that is followed
    /// by `(`, `=` or `;`.
    fn parse_statement(&mut self, parent: NodeId) -> Result<()> {
        let run = self.type_run();
        let follows = self.peek_nth(run);
        let is_declaration = run >= 2
            && self.peek_nth(run - 1).is_some_and(|t| t.kind == TokenKind::Identifier)
            && follows.is_some_and(|t| {
                t.is_punct(Punct::LParen)
                    || t.is_punct(Punct::Semicolon)
                    || t.operator() == Some(OperatorId::Assign)
            });

        if !is_declaration {
            let expr = self.parse_expression(&[Punct::Semicolon])?;
            self.consume_punct(Punct::Semicolon)?;
            self.ast.attach(parent, expr);
            return Ok(());
        }

        let ty = self.parse_type(run - 1);
        let name = self.parse_name()?;
        let at = self.ast.node(name).token;
        let next = self.current()?;
        match next.kind {
            TokenKind::Punct(Punct::LParen) => self.parse_function(parent, ty, name),
            TokenKind::Punct(Punct::Semicolon) => {
                self.advance();
                let decl = self.ast.add(NodeKind::VariableDeclaration, at);
                self.ast.attach(parent, decl);
                self.ast.attach(decl, ty);
                self.ast.attach(decl, name);
                Ok(())
            }
            _ => {
                self.advance();
                let value = self.parse_expression(&[Punct::Semicolon])?;
                self.consume_punct(Punct::Semicolon)?;
                let def = self.ast.add(NodeKind::VariableDefinition, at);
                self.ast.attach(parent, def);
                self.ast.attach(def, ty);
                self.ast.attach(def, name);
                self.ast.attach(def, value);
                Ok(())
            }
        }
    }

    fn parse_function(&mut self, parent: NodeId, ty: NodeId, name: NodeId) -> Result<()> {
        let open = self.consume_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.take_punct(Punct::RParen) {
            loop {
                params.push(self.parse_parameter(open)?);
                if self.take_punct(Punct::RParen) {
                    break;
                }
                self.consume_punct(Punct::Comma)?;
            }
        }

        let next = self.current()?;
        let kind = match next.kind {
            TokenKind::Punct(Punct::Semicolon) => NodeKind::FunctionDeclaration,
            TokenKind::Punct(Punct::LBrace) => NodeKind::FunctionDefinition,
            _ => return Err(self.unexpected(next, "`;` or `{`")),
        };
        self.advance();

        let function = self.ast.add(kind, self.ast.node(name).token);
        self.ast.attach(parent, function);
        self.ast.attach(function, ty);
        self.ast.attach(function, name);
        for param in params {
            self.ast.attach(function, param);
        }
        if next.is_punct(Punct::LBrace) {
            let body = self.push(function, NodeKind::Body);
            self.nested(next.loc, |p| p.parse_block(body, Some(next.loc)))?;
        }
        Ok(())
    }

    /// `type [name]`, up to the next `,` or `)`.
    fn parse_parameter(&mut self, open: TokenId) -> Result<NodeId> {
        let run = self.type_run();
        if run == 0 {
            let token = self.current()?;
            return Err(self.unexpected(token, "a parameter type"));
        }
        let named = run >= 2
            && self.peek_nth(run - 1).is_some_and(|t| t.kind == TokenKind::Identifier)
            && self
                .peek_nth(run)
                .is_some_and(|t| t.is_punct(Punct::Comma) || t.is_punct(Punct::RParen));

        let param = self.ast.add(NodeKind::Parameter, Some(open));
        let ty = self.parse_type(if named { run - 1 } else { run });
        self.ast.attach(param, ty);
        if named {
            let name = self.parse_name()?;
            self.ast.attach(param, name);
        }
        Ok(param)
    }

    fn parse_return(&mut self, parent: NodeId) -> Result<()> {
        let token = self.advance();
        let ret = self.ast.push(parent, NodeKind::Return, Some(token));
        if self.take_punct(Punct::Semicolon) {
            return Ok(());
        }
        let value = self.parse_expression(&[Punct::Semicolon])?;
        self.consume_punct(Punct::Semicolon)?;
        self.ast.attach(ret, value);
        Ok(())
    }

    fn parse_typedef(&mut self, parent: NodeId) -> Result<()> {
        let token = self.advance();
        let node = self.ast.push(parent, NodeKind::Typedef, Some(token));
        let (ty, name) = self.parse_declaration_head()?;
        self.check_type_name(name)?;
        self.consume_punct(Punct::Semicolon)?;

        let ty = self.ast.add(NodeKind::Type(ty.clone()), ty.first().copied());
        self.ast.attach(node, ty);
        self.attach_name(node, name);
        Ok(())
    }

    fn parse_struct(&mut self, parent: NodeId) -> Result<()> {
        let token = self.advance();
        let name = self.current()?;
        let name_id = self.advance();
        self.check_type_name(name_id)?;
        let node = self.ast.push(parent, NodeKind::Struct, Some(token));
        self.ast.push(node, NodeKind::String(name.text.as_str().into()), Some(name_id));

        self.parse_members(node)?;
        self.consume_punct(Punct::Semicolon)?;
        Ok(())
    }

    /// `{ (type name ;)* }`
    fn parse_members(&mut self, node: NodeId) -> Result<()> {
        let open = self.consume_punct(Punct::LBrace)?;
        let loc = self.tokens[open.index()].loc;
        self.nested(loc, |p| {
            while !p.take_punct(Punct::RBrace) {
                p.parse_variable_declaration(node)?;
            }
            Ok(())
        })
    }

    /// `type name ;` as a `VariableDeclaration` branch of `parent`.
    fn parse_variable_declaration(&mut self, parent: NodeId) -> Result<()> {
        let (ty, name) = self.parse_declaration_head()?;
        self.consume_punct(Punct::Semicolon)?;
        let decl = self.ast.push(parent, NodeKind::VariableDeclaration, Some(name));
        let ty = self.ast.add(NodeKind::Type(ty.clone()), ty.first().copied());
        self.ast.attach(decl, ty);
        self.attach_name(decl, name);
        Ok(())
    }

    /// Consumes `type name` and returns the type tokens and the name token.
    fn parse_declaration_head(&mut self) -> Result<(Vec<TokenId>, TokenId)> {
        let run = self.type_run();
        let ends_in_name = self
            .peek_nth(run.wrapping_sub(1))
            .is_some_and(|t| t.kind == TokenKind::Identifier);
        if run < 2 || !ends_in_name {
            let token = self.peek_nth(run).or_else(|| self.peek());
            return Err(match token {
                Some(token) => self.unexpected(token, "a type followed by a name"),
                None => self.eof("a type followed by a name"),
            });
        }
        let ty = (0..run - 1).map(|_| self.advance()).collect();
        let name = self.advance();
        Ok((ty, name))
    }

    fn parse_layout(&mut self, parent: NodeId) -> Result<()> {
        let layout_token = self.advance();
        self.consume_punct(Punct::LParen)?;
        let mut qualifiers = Vec::new();
        loop {
            qualifiers.push(self.parse_expression(&[Punct::Comma, Punct::RParen])?);
            if self.take_punct(Punct::RParen) {
                break;
            }
            self.consume_punct(Punct::Comma)?;
        }

        let kind_token = self.current()?;
        let kind = match kind_token.kind {
            TokenKind::Keyword(Keyword::In) => LayoutKind::In,
            TokenKind::Keyword(Keyword::Out) => LayoutKind::Out,
            TokenKind::Keyword(Keyword::UniformBuffer) => LayoutKind::UniformBuffer,
            TokenKind::Keyword(Keyword::Sampler1D) => LayoutKind::Sampler1D,
            TokenKind::Keyword(Keyword::Sampler2D) => LayoutKind::Sampler2D,
            TokenKind::Keyword(Keyword::Sampler3D) => LayoutKind::Sampler3D,
            _ => {
                let error = Error::ExpectedLayoutKind(kind_token.text.clone());
                return Err(self.error(kind_token.loc, error));
            }
        };
        self.advance();

        let node = self.ast.add(NodeKind::Layout(kind), Some(layout_token));
        self.ast.attach(parent, node);
        for qualifier in qualifiers {
            self.ast.attach(node, qualifier);
        }

        if matches!(kind, LayoutKind::In | LayoutKind::Out) {
            return self.parse_variable_declaration(node);
        }

        let is_inline_block = self.peek_nth(0).is_some_and(|t| t.kind == TokenKind::Identifier)
            && self.peek_nth(1).is_some_and(|t| t.is_punct(Punct::LBrace));
        let is_lone_name = self.peek_nth(0).is_some_and(|t| t.kind == TokenKind::Identifier)
            && self.peek_nth(1).is_some_and(|t| t.is_punct(Punct::Semicolon));

        if is_inline_block {
            let name_id = self.advance();
            let name = self.tokens[name_id.index()].text.clone();
            let block = self.push(node, NodeKind::Struct);
            let struct_name = format!("{name}{UNIFORM_STRUCT_SUFFIX}");
            self.ast.push(block, NodeKind::String(struct_name.into()), Some(name_id));
            self.parse_members(block)?;

            match self.current()? {
                t if t.kind == TokenKind::Identifier => {
                    let instance = self.advance();
                    self.attach_name(node, instance);
                }
                _ => {
                    self.ast.push(node, NodeKind::String(name.into()), Some(name_id));
                }
            }
            self.consume_punct(Punct::Semicolon)?;
        } else if is_lone_name {
            let name = self.advance();
            self.attach_name(node, name);
            self.advance();
        } else {
            self.parse_variable_declaration(node)?;
        }
        Ok(())
    }

    /// Control flow is recognized but not parsed yet: the statement becomes a
    /// node of its kind with no branches and its tokens are skipped.
    fn skip_control_flow(&mut self, parent: NodeId, keyword: Keyword) -> Result<()> {
        let token = self.current()?;
        let kind = match keyword {
            Keyword::If => NodeKind::If,
            Keyword::Else => NodeKind::Else,
            Keyword::For => NodeKind::For,
            Keyword::While => NodeKind::While,
            _ => NodeKind::Switch,
        };
        self.push(parent, kind);
        self.report(token.loc, &Error::ControlFlowNotExpanded(token.text.clone()));
        tracing::debug!(at = %token.loc, keyword = %token.text, "skipping control flow");
        self.skip_statement()
    }

    /// Skips one statement: a keyword-led construct with its header, a
    /// balanced `{...}` block, or anything up to and including `;`.
    fn skip_statement(&mut self) -> Result<()> {
        let token = self.current()?;
        match token.kind {
            TokenKind::Keyword(Keyword::If | Keyword::For | Keyword::While | Keyword::Switch) => {
                self.advance();
                if self.peek().is_some_and(|t| t.is_punct(Punct::LParen)) {
                    self.skip_balanced(Punct::LParen, Punct::RParen)?;
                }
                self.nested(token.loc, |p| p.skip_statement())?;
                if token.is_keyword(Keyword::If)
                    && self.peek().is_some_and(|t| t.is_keyword(Keyword::Else))
                {
                    self.advance();
                    self.nested(token.loc, |p| p.skip_statement())?;
                }
                Ok(())
            }
            TokenKind::Keyword(Keyword::Else) => {
                self.advance();
                self.nested(token.loc, |p| p.skip_statement())
            }
            TokenKind::Punct(Punct::LBrace) => self.skip_balanced(Punct::LBrace, Punct::RBrace),
            _ => {
                let mut depth = 0_usize;
                loop {
                    let token = self.current()?;
                    if token.is_punct(Punct::RBrace) && depth == 0 {
                        return Ok(());
                    }
                    self.advance();
                    match token.kind {
                        TokenKind::Punct(Punct::LParen | Punct::LBrace) => depth += 1,
                        TokenKind::Punct(Punct::RParen | Punct::RBrace) => {
                            depth = depth.saturating_sub(1);
                        }
                        TokenKind::Punct(Punct::Semicolon) if depth == 0 => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }

    fn skip_balanced(&mut self, open: Punct, close: Punct) -> Result<()> {
        let mut depth = 0_usize;
        loop {
            let token = self.current()?;
            self.advance();
            if token.is_punct(open) {
                depth += 1;
            } else if token.is_punct(close) {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
    }

    /// Parses an expression up to (not including) one of `ends`.
    fn parse_expression(&mut self, ends: &[Punct]) -> Result<NodeId> {
        self.parse_expression_with_height(ends).map(|(node, _)| node)
    }

    /// Operands and operators are scanned left to right, resolving each
    /// operator spelling by whether an operand precedes it. An operator waits
    /// on a stack until one that binds looser arrives or the expression ends,
    /// so the tree is built in a single pass.
    ///
    /// Also returns the height of the built tree.
    fn parse_expression_with_height(&mut self, ends: &[Punct]) -> Result<(NodeId, u32)> {
        let start = self.current()?;
        let mut operands: Vec<(NodeId, u32)> = Vec::new();
        let mut operators: Vec<Pending<'lang>> = Vec::new();
        let mut expect_operand = true;

        loop {
            let Some(token) = self.peek() else {
                break;
            };
            if let TokenKind::Punct(punct) = token.kind {
                if ends.contains(&punct) {
                    break;
                }
            }

            match token.kind {
                TokenKind::Operator(_) => {
                    let Some(def) = self.lang.resolve_operator(&token.text, !expect_operand) else {
                        let error = Error::MisplacedOperator(token.text.clone());
                        return Err(self.error(token.loc, error));
                    };
                    let id = self.advance();
                    let node = self.ast.add(NodeKind::Operator(def.id), Some(id));
                    if def.needs_left() {
                        while let Some(&(top, top_def, loc)) = operators.last() {
                            if !top_def.binds_before(def) {
                                break;
                            }
                            operators.pop();
                            self.apply(top, top_def, loc, &mut operands)?;
                        }
                    }
                    if def.needs_right() {
                        operators.push((node, def, token.loc));
                        expect_operand = true;
                    } else {
                        self.apply(node, def, token.loc, &mut operands)?;
                        expect_operand = false;
                    }
                }
                TokenKind::Punct(_) if !expect_operand => {
                    return Err(self.unexpected(token, closer_name(ends)));
                }
                _ if !expect_operand => {
                    return Err(self.error(token.loc, Error::MissingOperator(token.text.clone())));
                }
                TokenKind::Punct(Punct::LParen) => {
                    self.advance();
                    let inner = self.nested(token.loc, |p| {
                        p.parse_expression_with_height(&[Punct::RParen])
                    })?;
                    self.consume_punct(Punct::RParen)?;
                    operands.push(inner);
                    expect_operand = false;
                }
                _ => {
                    operands.push(self.parse_operand()?);
                    expect_operand = false;
                }
            }
        }

        if expect_operand {
            if let Some(&(node, _, _)) = operators.last() {
                return Err(self.operand_missing(node));
            }
        }
        while let Some((node, def, loc)) = operators.pop() {
            self.apply(node, def, loc, &mut operands)?;
        }
        match (operands.pop(), operands.is_empty()) {
            (Some(root), true) => Ok(root),
            _ => Err(self.error(start.loc, Error::EmptyExpression)),
        }
    }

    /// Attaches the operands of `node` from the top of `operands` and pushes
    /// the result back.
    fn apply(
        &mut self,
        node: NodeId,
        def: &OperatorDef,
        loc: Location,
        operands: &mut Vec<(NodeId, u32)>,
    ) -> Result<()> {
        let right = if def.needs_right() { operands.pop() } else { None };
        let left = if def.needs_left() { operands.pop() } else { None };
        if (def.needs_right() && right.is_none()) || (def.needs_left() && left.is_none()) {
            return Err(self.operand_missing(node));
        }

        let mut height = 0;
        for (operand, operand_height) in [left, right].into_iter().flatten() {
            self.ast.attach(node, operand);
            height = height.max(operand_height);
        }
        let height = height + 1;
        if height > MAX_DEPTH {
            return Err(self.error(loc, Error::TooDeeplyNested));
        }
        operands.push((node, height));
        Ok(())
    }

    /// A literal, a variable or a function call, with the height of its node.
    fn parse_operand(&mut self) -> Result<(NodeId, u32)> {
        let token = self.current()?;
        let called = self.peek_nth(1).is_some_and(|t| t.is_punct(Punct::LParen));
        match token.kind {
            TokenKind::Literal(LiteralKind::String) => {
                let id = self.advance();
                Ok((self.ast.add(NodeKind::String(token.text.as_str().into()), Some(id)), 1))
            }
            TokenKind::Literal(kind) => {
                let Some(constant) = parse_constant(kind, &token.text) else {
                    return Err(self.error(token.loc, Error::InvalidLiteral(token.text.clone())));
                };
                let id = self.advance();
                Ok((self.ast.add(NodeKind::Constant(constant), Some(id)), 1))
            }
            TokenKind::Identifier | TokenKind::Primitive(_) if called => self.parse_call(),
            TokenKind::Identifier => {
                let id = self.advance();
                let variable = self.ast.add(NodeKind::Variable, Some(id));
                self.attach_name(variable, id);
                Ok((variable, 2))
            }
            TokenKind::Primitive(_) => {
                Err(self.error(token.loc, Error::TypeInExpression(token.text.clone())))
            }
            _ => Err(self.unexpected(token, "an expression")),
        }
    }

    /// `name ( [expr (, expr)*] )`
    fn parse_call(&mut self) -> Result<(NodeId, u32)> {
        let name = self.advance();
        let call = self.ast.add(NodeKind::FunctionCall, Some(name));
        self.attach_name(call, name);
        let open = self.consume_punct(Punct::LParen)?;
        let loc = self.tokens[open.index()].loc;

        // The name is a leaf below the call.
        let mut height = 1;
        self.nested(loc, |p| {
            if p.take_punct(Punct::RParen) {
                return Ok(());
            }
            loop {
                let (arg, arg_height) =
                    p.parse_expression_with_height(&[Punct::Comma, Punct::RParen])?;
                p.ast.attach(call, arg);
                height = height.max(arg_height);
                if p.take_punct(Punct::RParen) {
                    return Ok(());
                }
                p.consume_punct(Punct::Comma)?;
            }
        })?;
        Ok((call, height + 1))
    }

    /// Number of consecutive primitive or identifier tokens at the cursor.
    fn type_run(&self) -> usize {
        self.tokens[self.cursor.min(self.tokens.len())..]
            .iter()
            .take_while(|t| matches!(t.kind, TokenKind::Primitive(_) | TokenKind::Identifier))
            .count()
    }

    /// Consumes `len` tokens into a detached `Type` node.
    fn parse_type(&mut self, len: usize) -> NodeId {
        let first = (len > 0).then(|| TokenId(self.cursor_id()));
        let tokens = (0..len).map(|_| self.advance()).collect();
        self.ast.add(NodeKind::Type(tokens), first)
    }

    /// Consumes an identifier into a detached `String` node.
    fn parse_name(&mut self) -> Result<NodeId> {
        let token = self.current()?;
        if token.kind != TokenKind::Identifier {
            return Err(self.unexpected(token, "a name"));
        }
        let id = self.advance();
        Ok(self.ast.add(NodeKind::String(token.text.as_str().into()), Some(id)))
    }

    fn attach_name(&mut self, parent: NodeId, name: TokenId) {
        let text = self.tokens[name.index()].text.as_str();
        self.ast.push(parent, NodeKind::String(text.into()), Some(name));
    }

    /// A struct or typedef name must be a fresh identifier.
    fn check_type_name(&mut self, name: TokenId) -> Result<()> {
        let tokens = self.tokens;
        let token = &tokens[name.index()];
        let legal = token.kind == TokenKind::Identifier
            && token.text.starts_with(|c: char| c == '_' || c.is_ascii_alphabetic());
        if !legal {
            return Err(self.error(token.loc, Error::InvalidName(token.text.clone())));
        }
        if self.type_names.contains(&token.text) {
            return Err(self.error(token.loc, Error::TypeRedefinition(token.text.clone())));
        }
        self.type_names.push(token.text.clone());
        Ok(())
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let token = self.peek().map(|_| TokenId(self.cursor_id()));
        self.ast.push(parent, kind, token)
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, loc: Location, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(loc, Error::TooDeeplyNested));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

impl<'t> Parser<'t, '_, '_> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.cursor.checked_add(n)?)
    }

    /// The current token, or an error at the end of input.
    fn current(&mut self) -> Result<&'t Token> {
        match self.peek() {
            Some(token) => Ok(token),
            None => Err(self.eof("more input")),
        }
    }

    fn cursor_id(&self) -> u32 {
        u32::try_from(self.cursor).unwrap_or(u32::MAX)
    }

    /// Returns the id of the current token and advances.
    fn advance(&mut self) -> TokenId {
        let id = TokenId(self.cursor_id());
        self.cursor += 1;
        id
    }

    /// Advances if the current token is `punct`, returning true.
    fn take_punct(&mut self, punct: Punct) -> bool {
        if self.peek().is_some_and(|t| t.is_punct(punct)) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token is `punct`. If not, records an error.
    fn consume_punct(&mut self, punct: Punct) -> Result<TokenId> {
        match self.peek() {
            Some(token) if token.is_punct(punct) => Ok(self.advance()),
            Some(token) => Err(self.unexpected(token, punct_name(punct))),
            None => Err(self.eof(punct_name(punct))),
        }
    }

    fn report(&mut self, loc: Location, error: &Error) {
        self.session.diagnostics.report(loc, error);
    }

    /// Records an error and returns it.
    fn error(&mut self, loc: Location, error: Error) -> Located<Error> {
        self.report(loc, &error);
        loc.wrap(error)
    }

    fn unexpected(&mut self, token: &Token, expected: &'static str) -> Located<Error> {
        let error = Error::Unexpected {
            found: token.text.clone(),
            expected,
        };
        self.error(token.loc, error)
    }

    fn eof(&mut self, expected: &'static str) -> Located<Error> {
        let loc = match self.tokens.last() {
            Some(token) => token.loc,
            None => Location::new(self.session.file("<input>"), 1, 1),
        };
        self.error(loc, Error::UnexpectedEof { expected })
    }

    fn operand_missing(&mut self, operator: NodeId) -> Located<Error> {
        let tokens = self.tokens;
        let token = self.ast.node(operator).token.map(|id| &tokens[id.index()]);
        match token {
            Some(token) => self.error(token.loc, Error::MissingOperand(token.text.clone())),
            None => self.eof("an operand"),
        }
    }
}

fn parse_constant(kind: LiteralKind, text: &str) -> Option<Constant> {
    match kind {
        LiteralKind::Int => {
            let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => text.parse(),
            };
            value.ok().map(Constant::Int)
        }
        LiteralKind::Float => {
            let digits = text.strip_suffix(['f', 'F']).unwrap_or(text);
            digits.parse().ok().map(Constant::Float)
        }
        LiteralKind::Char => {
            let byte = match text.chars().next() {
                Some(c) => u8::try_from(u32::from(c)).ok()?,
                None => 0,
            };
            Some(Constant::Byte(byte))
        }
        LiteralKind::String => None,
    }
}

/// What may close an expression that stops at one of `ends`.
fn closer_name(ends: &[Punct]) -> &'static str {
    match ends {
        [Punct::Comma, Punct::RParen] => "`,` or `)`",
        [punct] => punct_name(*punct),
        _ => "an operator",
    }
}

fn punct_name(punct: Punct) -> &'static str {
    match punct {
        Punct::Comma => "`,`",
        Punct::Semicolon => "`;`",
        Punct::Colon => "`:`",
        Punct::Question => "`?`",
        Punct::LParen => "`(`",
        Punct::RParen => "`)`",
        Punct::LBrace => "`{`",
        Punct::RBrace => "`}`",
        Punct::LBracket => "`[`",
        Punct::RBracket => "`]`",
        Punct::Hash => "`#`",
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("expected {expected}, found `{found}`")]
    Unexpected {
        found: String,
        expected: &'static str,
    },
    #[error("expected {expected}, found end of input")]
    UnexpectedEof { expected: &'static str },
    #[error("`{0}` is not a valid type name")]
    InvalidName(String),
    #[error("type `{0}` is already defined")]
    TypeRedefinition(String),
    #[error("expected an operator before `{0}`")]
    MissingOperator(String),
    #[error("operator `{0}` is missing an operand")]
    MissingOperand(String),
    #[error("operator `{0}` cannot appear here")]
    MisplacedOperator(String),
    #[error("expected an expression")]
    EmptyExpression,
    #[error("invalid literal `{0}`")]
    InvalidLiteral(String),
    #[error("type `{0}` cannot be used as a value")]
    TypeInExpression(String),
    #[error("expected a layout kind, found `{0}`")]
    ExpectedLayoutKind(String),
    #[error("nesting is too deep")]
    TooDeeplyNested,
    #[error("`{0}` statements are not parsed yet and were skipped")]
    ControlFlowNotExpanded(String),
}

impl Coded for Error {
    fn code(&self) -> u32 {
        diagnostics::SYNTAX
            | match self {
                Error::Unexpected { .. } => 1,
                Error::UnexpectedEof { .. } => 2,
                Error::InvalidName(_) => 3,
                Error::TypeRedefinition(_) => 4,
                Error::MissingOperator(_) => 5,
                Error::MissingOperand(_) => 6,
                Error::MisplacedOperator(_) => 7,
                Error::EmptyExpression => 8,
                Error::InvalidLiteral(_) => 9,
                Error::TypeInExpression(_) => 10,
                Error::ExpectedLayoutKind(_) => 11,
                Error::TooDeeplyNested => 12,
                Error::ControlFlowNotExpanded(_) => 13,
            }
    }

    fn severity(&self) -> Severity {
        match self {
            Error::ControlFlowNotExpanded(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use parser;

        fn multiplication_binds_tighter() {
            let expr = "1+2*3";
            let tree_ok = "
                operator Add
                  constant int 1
                  operator Multiply
                    constant int 2
                    constant int 3
            ";
        }

        fn parentheses_group() {
            let expr = "(1 + 2) * 3";
            let tree_ok = "
                operator Multiply
                  operator Add
                    constant int 1
                    constant int 2
                  constant int 3
            ";
        }

        fn assignment_is_right_associative() {
            let program = "a=b=c;";
            let tree_ok = "
                operator Assign
                  variable
                    string a
                  operator Assign
                    variable
                      string b
                    variable
                      string c
            ";
        }

        fn subtraction_of_negation() {
            let expr = "a - -b";
            let tree_ok = "
                operator Subtract
                  variable
                    string a
                  operator Negate
                    variable
                      string b
            ";
        }

        fn postfix_binds_before_prefix() {
            let expr = "++a++";
            let tree_ok = "
                operator PreIncrement
                  operator PostIncrement
                    variable
                      string a
            ";
        }

        fn negated_post_increment() {
            let expr = "-a++";
            let tree_ok = "
                operator Negate
                  operator PostIncrement
                    variable
                      string a
            ";
        }

        fn post_increment_then_addition() {
            let expr = "a++ + b";
            let tree_ok = "
                operator Add
                  operator PostIncrement
                    variable
                      string a
                  variable
                    string b
            ";
        }

        fn member_access_then_post_increment() {
            let expr = "a.b++";
            let tree_ok = "
                operator PostIncrement
                  operator Dot
                    variable
                      string a
                    variable
                      string b
            ";
        }

        fn negation_binds_before_multiplication() {
            let expr = "-x * y";
            let tree_ok = "
                operator Multiply
                  operator Negate
                    variable
                      string x
                  variable
                    string y
            ";
        }

        fn nested_calls() {
            let expr = "f(1, g(x), 2.5)";
            let tree_ok = "
                call
                  string f
                  constant int 1
                  call
                    string g
                    variable
                      string x
                  constant float 2.5
            ";
        }

        fn constructor_call_with_literals() {
            let expr = "vec3(1.0, 0.5f, 0x10)";
            let tree_ok = "
                call
                  string vec3
                  constant float 1.0
                  constant float 0.5
                  constant int 16
            ";
        }

        fn char_and_string_literals() {
            let expr = r#"print('a', "hi")"#;
            let tree_ok = "
                call
                  string print
                  constant byte 97
                  string hi
            ";
        }

        fn variable_definition() {
            let program = "int x = 1 + 2;";
            let tree_ok = "
                variable-definition
                  type int
                  string x
                  operator Add
                    constant int 1
                    constant int 2
            ";
        }

        fn qualified_declaration() {
            let program = "const unsigned int count; extern Light sun;";
            let tree_ok = "
                variable-declaration
                  type const unsigned int
                  string count
                variable-declaration
                  type Light
                  string sun
            ";
        }

        fn function_definition() {
            let program = "void main(int a, float) { int b = a; { b++; } return; }";
            let tree_ok = "
                function-definition
                  type void
                  string main
                  parameter
                    type int
                    string a
                  parameter
                    type float
                  body
                    variable-definition
                      type int
                      string b
                      variable
                        string a
                    body
                      operator PostIncrement
                        variable
                          string b
                    return
            ";
        }

        fn function_declarations() {
            let program = "float length(vec3 v); int f(void);";
            let tree_ok = "
                function-declaration
                  type float
                  string length
                  parameter
                    type vec3
                    string v
                function-declaration
                  type int
                  string f
                  parameter
                    type void
            ";
        }

        fn return_with_value() {
            let program = "int one() { return 1; }";
            let tree_ok = "
                function-definition
                  type int
                  string one
                  body
                    return
                      constant int 1
            ";
        }

        fn struct_definition() {
            let program = "struct Light { vec3 position; const float intensity; };";
            let tree_ok = "
                struct
                  string Light
                  variable-declaration
                    type vec3
                    string position
                  variable-declaration
                    type const float
                    string intensity
            ";
        }

        fn typedef_definition() {
            let program = "typedef unsigned int uint;";
            let tree_ok = "
                typedef
                  type unsigned int
                  string uint
            ";
        }

        fn layout_input() {
            let program = "layout(location = 0) in vec3 position;";
            let tree_ok = "
                layout In
                  operator Assign
                    variable
                      string location
                    constant int 0
                  variable-declaration
                    type vec3
                    string position
            ";
        }

        fn layout_uniform_block() {
            let program = "layout(binding = 1) UniformBuffer Camera { mat4 view; } camera;";
            let tree_ok = "
                layout UniformBuffer
                  operator Assign
                    variable
                      string binding
                    constant int 1
                  struct
                    string Camera_uniform_qwerty
                    variable-declaration
                      type mat4
                      string view
                  string camera
            ";
        }

        fn layout_sampler() {
            let program = "layout(binding = 2, set = 0) Sampler2D albedo;";
            let tree_ok = "
                layout Sampler2D
                  operator Assign
                    variable
                      string binding
                    constant int 2
                  operator Assign
                    variable
                      string set
                    constant int 0
                  string albedo
            ";
        }

        fn control_flow_is_skipped() {
            let program = "void main() { if (a > b) { a = b; } else a = 1; int c; }";
            let tree_error = "
                function-definition
                  type void
                  string main
                  body
                    if
                    variable-declaration
                      type int
                      string c
            ";
            let expected_errors = &[
                "test.horse -> 1:15 Warning (0x1010d): `if` statements are not parsed yet and were skipped",
            ];
        }

        fn missing_operand() {
            let program = "int x = 1 +;";
            let expected_errors = &[
                "test.horse -> 1:11 Error (0x10106): operator `+` is missing an operand",
            ];
        }

        fn missing_operator() {
            let program = "a b + c;";
            let expected_errors = &[
                "test.horse -> 1:3 Error (0x10105): expected an operator before `b`",
            ];
        }

        fn misplaced_operator() {
            let program = "x = * 2;";
            let expected_errors = &[
                "test.horse -> 1:5 Error (0x10107): operator `*` cannot appear here",
            ];
        }

        fn unclosed_parenthesis() {
            let program = "x = (a;";
            let expected_errors = &[
                "test.horse -> 1:7 Error (0x10101): expected `)`, found `;`",
            ];
        }

        fn unclosed_argument_list() {
            let program = "x = f(a;";
            let expected_errors = &[
                "test.horse -> 1:8 Error (0x10101): expected `,` or `)`, found `;`",
            ];
        }

        fn type_in_expression() {
            let program = "int = 3;";
            let expected_errors = &[
                "test.horse -> 1:1 Error (0x1010a): type `int` cannot be used as a value",
            ];
        }

        fn empty_parentheses() {
            let program = "();";
            let expected_errors = &[
                "test.horse -> 1:2 Error (0x10108): expected an expression",
            ];
        }

        fn unknown_layout_kind() {
            let program = "layout(binding = 0) uniform x;";
            let expected_errors = &[
                "test.horse -> 1:21 Error (0x1010b): expected a layout kind, found `uniform`",
            ];
        }

        fn unclosed_body() {
            let program = "void f() { int a;";
            let expected_errors = &[
                "test.horse -> 1:17 Error (0x10102): expected `}`, found end of input",
            ];
        }

        fn stray_closing_brace() {
            let program = "}";
            let expected_errors = &[
                "test.horse -> 1:1 Error (0x10101): expected a declaration, found `}`",
            ];
        }

        fn struct_name_must_be_an_identifier() {
            let program = "struct int { };";
            let expected_errors = &[
                "test.horse -> 1:8 Error (0x10103): `int` is not a valid type name",
            ];
        }

        fn type_names_are_unique() {
            let program = "typedef int a; typedef float a;";
            let expected_errors = &[
                "test.horse -> 1:30 Error (0x10104): type `a` is already defined",
            ];
        }
    );

    #[test]
    fn deep_nesting_is_an_error() {
        let lang = Language::default();
        let mut session = Session::new(&lang);
        let file = session.file("test.horse");
        let depth = MAX_DEPTH as usize + 10;
        let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let tokens = crate::lexer::lex_in_new(&mut session, file, &src);

        let err = parse_expr(&mut session, &tokens).unwrap_err();
        assert_eq!(err.inner, Error::TooDeeplyNested);
        assert!(session.diagnostics.has_errors());
    }

    fn nesting_error(src: &str) -> Error {
        let lang = Language::default();
        let mut session = Session::new(&lang);
        let file = session.file("test.horse");
        let tokens = crate::lexer::lex_in_new(&mut session, file, src);

        let err = parse(&mut session, &tokens).unwrap_err();
        assert!(session.diagnostics.has_errors());
        err.inner
    }

    #[test]
    fn deep_blocks_are_an_error() {
        let depth = MAX_DEPTH as usize + 10;
        let src = format!("{}{}", "{".repeat(depth), "}".repeat(depth));
        assert_eq!(nesting_error(&src), Error::TooDeeplyNested);
    }

    #[test]
    fn deep_skipped_statements_are_an_error() {
        let depth = MAX_DEPTH as usize + 10;
        let elses = format!("void main() {{ {}; }}", "else ".repeat(depth));
        assert_eq!(nesting_error(&elses), Error::TooDeeplyNested);

        let ifs = format!("void main() {{ {}; }}", "if (a) ".repeat(depth));
        assert_eq!(nesting_error(&ifs), Error::TooDeeplyNested);
    }

    #[test]
    fn deep_operator_chains_are_an_error() {
        let depth = MAX_DEPTH as usize + 10;
        let prefix = format!("int y = {}1;", "- ".repeat(depth));
        assert_eq!(nesting_error(&prefix), Error::TooDeeplyNested);

        let assignments = format!("{}1;", "a = ".repeat(depth));
        assert_eq!(nesting_error(&assignments), Error::TooDeeplyNested);
    }

    #[test]
    fn operator_chains_up_to_the_limit_are_fine() {
        let lang = Language::default();
        let mut session = Session::new(&lang);
        let file = session.file("test.horse");
        // A constant leaf under MAX_DEPTH - 1 negations.
        let src = format!("{}1", "- ".repeat(MAX_DEPTH as usize - 1));
        let tokens = crate::lexer::lex_in_new(&mut session, file, &src);

        assert!(parse_expr(&mut session, &tokens).is_ok());
        assert!(!session.diagnostics.has_errors());
    }

    #[test]
    fn literal_values() {
        assert_eq!(parse_constant(LiteralKind::Int, "0xff"), Some(Constant::Int(255)));
        assert_eq!(parse_constant(LiteralKind::Float, "2.f"), Some(Constant::Float(2.0)));
        assert_eq!(parse_constant(LiteralKind::Char, ""), Some(Constant::Byte(0)));
        assert_eq!(parse_constant(LiteralKind::Int, "12abc"), None);
    }
}
