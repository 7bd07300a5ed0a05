use thiserror::Error;

/// Fatal machine faults. Each one stops the interpreter for good; the
/// surrounding application decides whether to report or restart. None are
/// retried internally -- a malformed program is caller error, not a
/// transient failure.
#[derive(Debug, Error)]
pub enum Error {
    /// memory access outside 0x000..=0xfff
    #[error("memory access out of bounds at {addr:#05x}")]
    OutOfBounds { addr: u16 },

    /// subroutine call past the fixed stack depth
    #[error("call stack overflow")]
    StackOverflow,

    /// return with no caller on the stack
    #[error("call stack underflow")]
    StackUnderflow,

    /// no dispatch entry matches the decoded word; `addr` is where the word
    /// was fetched, before the program counter advanced
    #[error("unknown instruction {word:#06x} at {addr:#05x}")]
    UnknownInstruction { word: u16, addr: u16 },

    #[error("program image: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let e = Error::OutOfBounds { addr: 0x1000 };
        assert_eq!(e.to_string(), "memory access out of bounds at 0x1000");
        let e = Error::UnknownInstruction {
            word: 0xf0ff,
            addr: 0x200,
        };
        assert_eq!(e.to_string(), "unknown instruction 0xf0ff at 0x200");
    }
}
