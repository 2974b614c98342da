pub struct Settings {
    /// Locate the arguments of every call-style instruction of a verified body
    ///
    /// Failures are collected per call and don't make the method invalid: a call whose arguments
    /// can't be located just can't be rewritten.
    pub locate_call_arguments: bool,

    /// Require every located argument to be produced in the same basic block as its call
    ///
    /// Only meaningful when `locate_call_arguments` is set.
    pub require_same_block_arguments: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            locate_call_arguments: true,
            require_same_block_arguments: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
