use crate::AllocError;

/// The register budget and frame layout parameters of the target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Constraints {
    /// Number of physical registers available for allocation.
    pub registers: u32,

    /// Rounds of spilling after which allocation gives up.
    pub max_rounds: usize,

    /// Size in bytes of a spill slot.
    pub word_size: u32,
}

impl Constraints {
    pub const DEFAULT_MAX_ROUNDS: usize = 100;
    pub const DEFAULT_WORD_SIZE: u32 = 4;

    pub fn new(registers: u32) -> Self {
        Self {
            registers,
            max_rounds: Self::DEFAULT_MAX_ROUNDS,
            word_size: Self::DEFAULT_WORD_SIZE,
        }
    }

    pub fn with_max_rounds(self, max_rounds: usize) -> Self {
        Self { max_rounds, ..self }
    }

    pub fn with_word_size(self, word_size: u32) -> Self {
        Self { word_size, ..self }
    }

    pub(super) fn check(&self) -> Result<(), AllocError> {
        if self.registers == 0 {
            Err(AllocError::InvalidRegisterBudget)
        } else {
            Ok(())
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Self::new(8)
    }
}
