/*!
 * Interactive Input
 * Prompts for the three run parameters when they are not given as options
 */

use super::config::parse_positive;
use crate::core::errors::{MatmulError, MatmulResult, ValidationError};
use std::io::{BufRead, Write};

/// Values typed by the user, not yet range-checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptedDims {
    pub rows: usize,
    pub inner: usize,
    pub cycles: usize,
}

/// Ask for any value still missing, in the order rows, inner, cycles
pub fn prompt_missing<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    rows: Option<usize>,
    inner: Option<usize>,
    cycles: Option<usize>,
) -> MatmulResult<PromptedDims> {
    let rows = match rows {
        Some(value) => value,
        None => prompt(input, output, "Enter the row count (positive integer): ")?,
    };
    let inner = match inner {
        Some(value) => value,
        None => prompt(input, output, "Enter the inner dimension (positive integer): ")?,
    };
    let cycles = match cycles {
        Some(value) => value,
        None => prompt(input, output, "Enter the number of cycles (positive integer): ")?,
    };

    Ok(PromptedDims {
        rows,
        inner,
        cycles,
    })
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, text: &str) -> MatmulResult<usize> {
    write!(output, "{}", text)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(MatmulError::Validation(ValidationError::NotANumber(
            String::new(),
        )));
    }
    Ok(parse_positive(&line)?)
}
