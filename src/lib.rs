pub mod ast;
pub mod cli;
pub mod evaluator;
mod functions;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod references;
pub mod registry;
pub mod trace;
pub mod value;

pub use ast::{Node, Operator, Token, TokenKind};
pub use evaluator::{
    Arguments, DEFAULT_MAX_MEMORY, EvaluationContext, EvaluationError, EvaluationOptions, EvaluationResult,
    MemoryCounter,
};
pub use lexer::{Lexer, is_legal_keyword};
pub use output::{to_json, to_json_pretty};
pub use parser::{ExpressionParser, MAX_DEPTH, MAX_LENGTH, ParseError, ParseErrorKind};
pub use references::{PathSegment, ReferenceError, check_references_context, extract_path};
pub use registry::{ExpressionFunction, FunctionInfo, FunctionRegistry, NamedValueInfo, NamedValueProvider};
pub use trace::{NoopTraceWriter, SecretMasker, TraceWriter, TracingTraceWriter, ValueMasker};
pub use value::{Object, Value, ValueKind, format_number, format_value, parse_number};
