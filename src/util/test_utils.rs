use crate::{
    language::Language,
    lexer, parser, semantic,
    session::Session,
    symbols::SymbolTable,
    token::Token,
    types::TypeTable,
    util::fmt::{tree, Show},
};

pub const TEST_FILE: &str = "test.horse";

/// Formats every diagnostic of the session in its located form.
pub fn format_diagnostics(session: &Session<'_>) -> Vec<String> {
    let ctx = session.fmt_context();
    session
        .diagnostics
        .iter()
        .map(|d| format!("{:#}", d.display(&ctx)))
        .collect()
}

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    SemanticProgram(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    TreeError(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

fn lex(session: &mut Session<'_>, input: &str) -> Vec<Token> {
    let file = session.file(TEST_FILE);
    lexer::lex_in_new(session, file, input)
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let lang = Language::default();
    let session = &mut Session::new(&lang);

    let tree = match test {
        Test::ParserProgram(input) => {
            let tokens = lex(session, input);
            match parser::parse(session, &tokens) {
                Ok(ast) => tree::print_ast_string(&tokens, &ast),
                Err(_) => String::new(),
            }
        }
        Test::ParserExpr(input) => {
            let tokens = lex(session, input);
            match parser::parse_expr(session, &tokens) {
                Ok((ast, expr)) => tree::print_node_string(&tokens, &ast, expr),
                Err(_) => String::new(),
            }
        }
        Test::SemanticProgram(input) => {
            let tokens = lex(session, input);
            match parser::parse(session, &tokens) {
                Ok(ast) => {
                    let mut types = TypeTable::new();
                    let mut symbols = SymbolTable::new();
                    _ = semantic::analyze(session, &tokens, &ast, &mut types, &mut symbols);
                    tree::print_symbols_string(&tokens, &ast, &symbols)
                }
                Err(_) => String::new(),
            }
        }
    };
    (tree, format_diagnostics(session))
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::TreeError(expected_tree) => {
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, tree_error, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeError(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(semantic, program), $source:expr) => {
        crate::util::test_utils::Test::SemanticProgram($source)
    };
}
pub(crate) use tree_tests;
