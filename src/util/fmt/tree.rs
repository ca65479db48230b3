use std::io::Write;

use crate::{
    ast::{Ast, NodeId, NodeKind},
    symbols::{SymbolId, SymbolKind, SymbolTable, Value},
    token::Token,
};

const INDENT_WIDTH: usize = 2;

pub fn print_ast_string(tokens: &[Token], ast: &Ast) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_ast(&mut buf, tokens, ast).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_node_string(tokens: &[Token], ast: &Ast, node: NodeId) -> String {
    let mut buf = Vec::with_capacity(512);
    print_node(&mut buf, tokens, ast, 0, node).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_symbols_string(tokens: &[Token], ast: &Ast, symbols: &SymbolTable) -> String {
    let mut buf = Vec::with_capacity(512);
    print_symbols(&mut buf, tokens, ast, symbols).unwrap();
    String::from_utf8(buf).unwrap()
}

/// Prints the top-level items, one node per line, branches indented below
/// their node.
pub fn print_ast(w: &mut impl Write, tokens: &[Token], ast: &Ast) -> std::io::Result<()> {
    for &node in ast.branches(ast.root()) {
        print_node(w, tokens, ast, 0, node)?;
    }
    Ok(())
}

fn print_node(
    w: &mut impl Write,
    tokens: &[Token],
    ast: &Ast,
    i: usize,
    node: NodeId,
) -> std::io::Result<()> {
    sp(w, i)?;
    match ast.kind(node) {
        NodeKind::Root => writeln!(w, "root")?,
        NodeKind::VariableDeclaration => writeln!(w, "variable-declaration")?,
        NodeKind::VariableDefinition => writeln!(w, "variable-definition")?,
        NodeKind::FunctionDeclaration => writeln!(w, "function-declaration")?,
        NodeKind::FunctionDefinition => writeln!(w, "function-definition")?,
        NodeKind::Parameter => writeln!(w, "parameter")?,
        NodeKind::Body => writeln!(w, "body")?,
        NodeKind::If => writeln!(w, "if")?,
        NodeKind::Else => writeln!(w, "else")?,
        NodeKind::For => writeln!(w, "for")?,
        NodeKind::While => writeln!(w, "while")?,
        NodeKind::Switch => writeln!(w, "switch")?,
        NodeKind::Return => writeln!(w, "return")?,
        NodeKind::Constant(constant) => writeln!(w, "constant {constant}")?,
        NodeKind::Variable => writeln!(w, "variable")?,
        NodeKind::FunctionCall => writeln!(w, "call")?,
        NodeKind::Operator(op) => writeln!(w, "operator {op:?}")?,
        NodeKind::String(name) => writeln!(w, "string {name}")?,
        NodeKind::Type(ids) => {
            write!(w, "type")?;
            for id in ids {
                write!(w, " {}", tokens[id.index()].text)?;
            }
            writeln!(w)?;
        }
        NodeKind::Struct => writeln!(w, "struct")?,
        NodeKind::Typedef => writeln!(w, "typedef")?,
        NodeKind::Layout(kind) => writeln!(w, "layout {kind:?}")?,
    }
    for &branch in ast.branches(node) {
        print_node(w, tokens, ast, i + 1, branch)?;
    }
    Ok(())
}

/// Prints the scope tree below the root. Unfolded initial values are printed
/// as `= <expr>`.
pub fn print_symbols(
    w: &mut impl Write,
    tokens: &[Token],
    ast: &Ast,
    symbols: &SymbolTable,
) -> std::io::Result<()> {
    for &symbol in symbols.children(symbols.root()) {
        print_symbol(w, tokens, ast, symbols, 0, symbol)?;
    }
    Ok(())
}

fn print_symbol(
    w: &mut impl Write,
    tokens: &[Token],
    ast: &Ast,
    symbols: &SymbolTable,
    i: usize,
    id: SymbolId,
) -> std::io::Result<()> {
    let symbol = symbols.get(id);
    let name = &symbol.name;
    sp(w, i)?;
    match &symbol.kind {
        SymbolKind::Root => writeln!(w, "root")?,
        SymbolKind::Block => writeln!(w, "block")?,
        SymbolKind::Struct(ty) => writeln!(w, "struct {name}: {ty}")?,
        SymbolKind::Function(function) => {
            write!(w, "function {name}(")?;
            for (idx, param) in function.params.iter().enumerate() {
                if idx > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{param}")?;
            }
            write!(w, "): {}", function.return_type)?;
            if !function.defined {
                write!(w, " (declared)")?;
            }
            writeln!(w)?;
        }
        SymbolKind::Variable(variable) => {
            write!(w, "variable {name}: ")?;
            if variable.is_const {
                write!(w, "const ")?;
            }
            write!(w, "{}", variable.ty)?;
            match variable.initial_value {
                Some(Value::Constant(constant)) => write!(w, " = {constant}")?,
                Some(Value::Expr(node)) => {
                    let kind = ast.kind(node);
                    let first = ast.node(node).token.map(|t| tokens[t.index()].text.as_str());
                    match (kind, first) {
                        (NodeKind::Operator(op), _) => write!(w, " = <{op:?}>")?,
                        (_, Some(text)) => write!(w, " = <{text}>")?,
                        (_, None) => write!(w, " = <expr>")?,
                    }
                }
                None => {}
            }
            if variable.modified {
                write!(w, " (modified)")?;
            }
            writeln!(w)?;
        }
    }
    for &child in symbols.children(id) {
        print_symbol(w, tokens, ast, symbols, i + 1, child)?;
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
