/// Configuration for span code generation.
///
/// # Examples
///
/// ```rust
/// use spangen::CodegenOptions;
///
/// let options = CodegenOptions {
///     debug_checks: true,
///     ..Default::default()
/// };
/// assert_eq!(options.error_reason, "Span callback error");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Status returned by a parser function after a span callback failed at
    /// an explicit span end and the resumption target has been recorded.
    /// Must not be `0`, the success status.
    ///
    /// # Default
    ///
    /// `-1`
    pub error_sentinel: i32,

    /// Message stored in the `reason` field whenever a span callback fails.
    /// Must not contain NUL bytes.
    ///
    /// # Default
    ///
    /// `"Span callback error"`
    pub error_reason: &'static str,

    /// Whether indirect callback calls emitted by the epilogue carry the list
    /// of possible callees.
    ///
    /// # Default
    ///
    /// `true`
    pub callee_hints: bool,

    /// Whether a span end that finds no open span traps.
    ///
    /// The allocator and the graph builder guarantee this never happens, so
    /// release output leaves the check out.
    ///
    /// # Default
    ///
    /// `false`
    pub debug_checks: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            error_sentinel: -1,
            error_reason: "Span callback error",
            callee_hints: true,
            debug_checks: false,
        }
    }
}
