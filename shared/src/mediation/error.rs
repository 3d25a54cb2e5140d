use thiserror::Error;

/// Errors raised while compiling or applying parameter mediation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediationError {
    /// Lexer hit a character outside the expression grammar
    #[error("Unexpected character '{found}' at offset {offset} in \"{expression}\"")]
    UnexpectedCharacter {
        found: char,
        offset: usize,
        expression: String,
    },

    /// Parser found a token it cannot place
    #[error("Unexpected token {found} in \"{expression}\"")]
    UnexpectedToken { found: String, expression: String },

    /// Expression ended early
    #[error("Unexpected end of expression \"{expression}\"")]
    UnexpectedEnd { expression: String },

    /// A string literal was never closed
    #[error("Unterminated string literal in \"{expression}\"")]
    UnterminatedString { expression: String },

    /// Transform nests deeper than the parser allows
    #[error("Expression nests deeper than {limit} levels: \"{expression}\"")]
    TooDeep { limit: usize, expression: String },

    /// Transform has more tokens than the parser allows
    #[error("Expression has {found} tokens, at most {limit} are allowed")]
    TooLong { limit: usize, found: usize },

    /// Call to a function the evaluator does not provide
    #[error("Unknown function {name}()")]
    UnknownFunction { name: String },

    /// Function called with the wrong number of arguments
    #[error("Function {function}() takes {expected} argument(s), got {found}")]
    WrongArity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    /// Identifier does not name a source parameter
    #[error("Unknown parameter {name}")]
    UnknownParameter { name: String },

    /// Positional reference past the end of the source parameters
    #[error("Parameter ${index} out of range ({len} source parameters)")]
    PositionOutOfRange { index: usize, len: usize },

    /// Operator or function applied to a value of the wrong type
    #[error("{operation} cannot be applied to {found}")]
    TypeMismatch {
        operation: &'static str,
        found: String,
    },

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Result is not representable as a JSON number
    #[error("Expression produced a non-finite number")]
    NonFiniteNumber,

    /// A mediated value does not match the channel's declared parameter type
    #[error("Parameter {param} expects {expected}, got {found}")]
    ParamTypeMismatch {
        param: String,
        expected: &'static str,
        found: String,
    },
}
