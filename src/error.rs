use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all possible error conditions that can occur while decoding Dalvik
/// bytecode, constructing the MIR control-flow graph, converting to SSA form, and running
/// the optimization passes. Each variant provides specific context about the failure mode
/// to enable appropriate error handling.
///
/// # Error Categories
///
/// ## Bytecode Decoding Errors
/// - [`Error::Malformed`] - Corrupt or internally inconsistent bytecode
/// - [`Error::OutOfBounds`] - Attempted to read beyond the code-unit array
/// - [`Error::NotSupported`] - Valid but unsupported instruction shape
/// - [`Error::Empty`] - Empty input provided
///
/// ## Graph Construction and Analysis Errors
/// - [`Error::GraphError`] - Control-flow graph invariant violations
/// - [`Error::TypeError`] - Primitive type system operation errors
/// - [`Error::LockError`] - Thread synchronization failure in shared services
///
/// A method hitting [`Error::NotSupported`] is not a compilation-job failure: the driver
/// maps it to a punt-to-interpreter outcome at method granularity. [`Error::Malformed`]
/// and [`Error::GraphError`] are fatal for the method being compiled and indicate either
/// corrupt input or an internal bug in graph construction.
///
/// # Examples
///
/// ```rust,ignore
/// use dexmir::{compile_method, CompileOptions, Error};
///
/// match compile_method(&body, &CompileOptions::default(), &cache) {
///     Ok(outcome) => println!("compiled"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed method: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode is damaged and could not be decoded or graphed.
    ///
    /// This error indicates that the code-unit stream does not conform to the
    /// Dalvik instruction format, or that an internal invariant of graph
    /// construction was violated. The error includes the source location where
    /// the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading code units.
    ///
    /// This error occurs when trying to read data beyond the end of the
    /// method's code-unit array, e.g. a truncated instruction or a switch
    /// payload extending past the end of the method.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This instruction or method shape is valid but not supported.
    ///
    /// Indicates bytecode the verifier accepts but this pipeline does not
    /// compile. The driver treats this as a soft failure and falls back to
    /// the interpreter for the method.
    #[error("This instruction or method shape is not supported")]
    NotSupported,

    /// Provided input was empty.
    ///
    /// This error occurs when an empty code-unit array is provided where an
    /// actual method body was expected.
    #[error("Provided input was empty")]
    Empty,

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories.
    #[error("{0}")]
    Error(String),

    /// Control-flow graph invariant violation.
    ///
    /// Errors related to graph construction and mutation: a successor block
    /// list already in use, a split point that could not be found, an edge
    /// to a hidden block. These indicate a bug in graph construction rather
    /// than a property of the input and are never retried.
    #[error("{0}")]
    GraphError(String),

    /// General error during primitive type reasoning.
    ///
    /// Covers type-table operations that can fail, such as requesting the
    /// component size of the void type.
    #[error("{0}")]
    TypeError(String),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when a
    /// shared service map is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}
