//! Interactive input. Bad input is reported and asked again, never fatal;
//! only a closed input stream ends the session.

use crate::coordinator::{validate_worker_count, MatmulRequest};
use crate::error::MatmulError;
use colored::Colorize;
use std::io::{self, BufRead, Write};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Asks for the four dimensions until they describe a valid product.
    pub fn read_request(&mut self) -> io::Result<MatmulRequest> {
        loop {
            let request = MatmulRequest {
                a_rows: self.ask_usize("Enter the number of rows of the first matrix: ")?,
                a_cols: self.ask_usize("Enter the number of columns of the first matrix: ")?,
                b_rows: self.ask_usize("Enter the number of rows of the second matrix: ")?,
                b_cols: self.ask_usize("Enter the number of columns of the second matrix: ")?,
            };
            match request.validate() {
                Ok(()) => return Ok(request),
                Err(err) => self.recover(err)?,
            }
        }
    }

    /// Asks for a worker count in `1..=max`.
    pub fn read_worker_count(&mut self, max: usize) -> io::Result<usize> {
        loop {
            let requested = self.ask_usize(&format!(
                "Enter the number of workers for the multiplication (1-{max}): "
            ))?;
            match validate_worker_count(requested, max) {
                Ok(count) => return Ok(count),
                Err(err) => self.recover(err)?,
            }
        }
    }

    fn ask_usize(&mut self, question: &str) -> io::Result<usize> {
        loop {
            write!(self.output, "{question}")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed before a value was entered",
                ));
            }
            match line.trim().parse::<usize>() {
                Ok(value) => return Ok(value),
                Err(_) => self.report("enter a whole non-negative number!")?,
            }
        }
    }

    /// Reports an input error so the caller can ask again; anything else
    /// ends the prompt.
    fn recover(&mut self, err: MatmulError) -> io::Result<()> {
        if err.is_input_error() {
            self.report(&err.to_string())
        } else {
            Err(io::Error::new(io::ErrorKind::InvalidInput, err))
        }
    }

    fn report(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{} {message}", "Error:".red().bold())
    }
}
