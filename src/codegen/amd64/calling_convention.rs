//! The System V AMD64 calling convention.

use super::x86::Register::{self, *};

const SYSTEM_V_PARAMS: &[Register] = &[Rdi, Rsi, Rdx, Rcx, R8, R9];

/// The register holding a procedure's return value.
pub const RETURN_REGISTER: Register = Rax;

/// Required alignment of the stack pointer at every call, in bytes.
pub const STACK_ALIGNMENT: i64 = 16;

/// The register carrying the argument at the given 0-based position, or
/// `None` when it is passed on the stack.
pub fn param_register(position: usize) -> Option<Register> {
    SYSTEM_V_PARAMS.get(position).copied()
}

/// Gets the maximum amount of parameters that can be passed via registers.
pub fn reg_param_count() -> usize {
    SYSTEM_V_PARAMS.len()
}

/// Offset from the callee's base pointer of a stack-passed argument. The
/// saved base pointer and the return address sit between the frame and the
/// first stack argument.
pub fn stack_param_offset(position: usize) -> i64 {
    16 + 8 * (position - reg_param_count()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seventh_argument_is_above_return_address() {
        assert_eq!(Some(Rdi), param_register(0));
        assert_eq!(Some(R9), param_register(5));
        assert_eq!(None, param_register(6));
        assert_eq!(16, stack_param_offset(6));
        assert_eq!(24, stack_param_offset(7));
    }
}
