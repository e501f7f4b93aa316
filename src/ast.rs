//! # Pipeline Expressions - Abstract Syntax Tree
//!
//! This module defines the syntax tree for the workflow expression language:
//! the small, JavaScript-flavoured language used in step conditions and
//! templated values such as `${{ github.event_name == 'push' }}`.
//!
//! ## Architecture Overview
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens and their operator-precedence metadata
//! - **[operators]** - Logical, comparison and index operators
//! - **[expressions]** - Expression nodes produced by the parser
//!
//! ## Quick Start
//!
//! ```text
//! success() && github.ref == 'refs/heads/main'
//! ```
//!
//! This condition calls a host function, dereferences a named-value and
//! compares the result with a string literal.
//!
//! ## Core Concepts
//!
//! ### Named-values and Functions
//!
//! The language has no variables. Every identifier that is not a literal is
//! either a *named-value* (`github`, `env`, `matrix`) or a *function*
//! (`contains(...)`), and both are supplied by the host at parse time.
//!
//! ### Property Access
//!
//! - `github.event` and `github['event']` both index an object
//! - `matrix.os[0]` indexes an array by integer
//! - `needs.*.result` projects every element through a wildcard
//!
//! ### Type System
//!
//! Values are JSON-like: null, boolean, number (always `f64`), string, array
//! and object. Comparison coerces operands the way JavaScript `==` does,
//! except that strings compare case-insensitively.
//!
//! ## Examples
//!
//! ### Status Check
//!
//! ```text
//! failure() || cancelled()
//! ```
//!
//! ### Formatting
//!
//! ```text
//! format('{0}-{1}', runner.os, matrix.arch)
//! ```
//!
//! ### Filtered Arrays
//!
//! ```text
//! contains(needs.*.result, 'failure')
//! ```
pub mod tokens;
pub mod expressions;
pub mod operators;

pub use tokens::{Associativity, Token, TokenKind};
pub use expressions::{Container, FunctionNode, NamedValueNode, Node, Traverse};
pub use operators::Operator;
