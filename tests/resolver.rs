mod common;

use rox::ast::{Expr, Stmt};
use rox::error::LoxError;
use rox::parser::Parser;
use rox::resolver::{Locals, Resolver};
use rox::scanner::Scanner;

use common::run_static_err;

fn resolve(source: &str) -> (Vec<Stmt>, Result<Locals, Vec<LoxError>>) {
    let (tokens, _) = Scanner::scan_all(source);
    let (stmts, errors) = Parser::new(&tokens).parse();
    assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
    let result = Resolver::new().resolve(&stmts);
    (stmts, result)
}

#[test]
fn global_references_have_no_entry() {
    let (stmts, result) = resolve("var a = 1; print a;");
    let locals = result.expect("resolves");

    let Stmt::Print(Expr::Variable(var)) = &stmts[1] else {
        panic!("expected print of variable");
    };
    assert!(!locals.contains_key(&var.id));
}

#[test]
fn distances_count_enclosing_scopes() {
    let (stmts, result) = resolve("{ var a = 1; { { print a; } } }");
    let locals = result.expect("resolves");

    let Stmt::Block(outer) = &stmts[0] else { panic!() };
    let Stmt::Block(middle) = &outer[1] else { panic!() };
    let Stmt::Block(inner) = &middle[0] else { panic!() };
    let Stmt::Print(Expr::Variable(var)) = &inner[0] else { panic!() };

    assert_eq!(locals.get(&var.id), Some(&2));
}

#[test]
fn shadowing_resolves_each_occurrence_separately() {
    let (stmts, result) = resolve("{ var a = 1; { var a = 2; print a; } print a; }");
    let locals = result.expect("resolves");

    let Stmt::Block(outer) = &stmts[0] else { panic!() };
    let Stmt::Block(inner) = &outer[1] else { panic!() };
    let Stmt::Print(Expr::Variable(inner_a)) = &inner[1] else { panic!() };
    let Stmt::Print(Expr::Variable(outer_a)) = &outer[2] else { panic!() };

    assert_eq!(locals.get(&inner_a.id), Some(&0));
    assert_eq!(locals.get(&outer_a.id), Some(&0));
    assert_ne!(inner_a.id, outer_a.id);
}

#[test]
fn self_reference_in_initializer_is_static_error() {
    assert_eq!(
        run_static_err("var a = a;"),
        vec!["Can't read local variable in its own initializer"]
    );
    assert_eq!(
        run_static_err("{ var b = b; }"),
        vec!["Can't read local variable in its own initializer"]
    );
}

#[test]
fn return_outside_function_is_rejected() {
    assert_eq!(
        run_static_err("return 1;"),
        vec!["Can't return from top-level code"]
    );
}

#[test]
fn returning_value_from_initializer_is_rejected() {
    assert_eq!(
        run_static_err("class A { init() { return 1; } }"),
        vec!["Can't return a value from an initializer"]
    );
}

#[test]
fn bare_return_in_initializer_is_allowed() {
    let (_, result) = resolve("class A { init() { return; } }");
    assert!(result.is_ok());
}

#[test]
fn this_and_super_need_a_class() {
    assert_eq!(
        run_static_err("print this;"),
        vec!["Can't use 'this' outside of a class"]
    );
    assert_eq!(
        run_static_err("fun f() { super.g(); }"),
        vec!["Can't use 'super' outside of a class"]
    );
    assert_eq!(
        run_static_err("class A { f() { super.g(); } }"),
        vec!["Can't use 'super' in a class with no superclass"]
    );
}

#[test]
fn class_cannot_inherit_from_itself() {
    assert_eq!(
        run_static_err("class A < A {}"),
        vec!["A class can't inherit from itself"]
    );
}

#[test]
fn local_redeclaration_is_rejected_but_global_is_not() {
    assert_eq!(
        run_static_err("{ var a = 1; var a = 2; }"),
        vec!["Already a variable with this name in this scope"]
    );

    let (_, result) = resolve("var a = 1; var a = 2;");
    assert!(result.is_ok());
}

#[test]
fn global_redeclaration_may_read_the_previous_binding() {
    let (_, result) = resolve("var a = 1; var a = a + 1;");
    assert!(result.is_ok());

    let (_, result) = resolve("fun f() {} var f = f;");
    assert!(result.is_ok());
}

#[test]
fn seeded_globals_count_as_initialized() {
    let (tokens, _) = Scanner::scan_all("var a = a + 1; var fresh = fresh;");
    let (stmts, _) = Parser::new(&tokens).parse();
    let errors = Resolver::with_globals(["a"]).resolve(&stmts).unwrap_err();

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error at 'fresh': Can't read local variable in its own initializer"
    );
}

#[test]
fn all_errors_are_collected_in_one_pass() {
    let errors = run_static_err("return 1;\nprint this;\n{ var c = c; }");

    assert_eq!(errors.len(), 3);
}

#[test]
fn resolver_error_carries_line_and_location() {
    let (_, result) = resolve("\n\nprint this;");
    let errors = result.unwrap_err();

    assert_eq!(
        errors[0].to_string(),
        "[line 3] Error at 'this': Can't use 'this' outside of a class"
    );
}
