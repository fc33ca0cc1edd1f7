use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

/// Console endpoint of the engine: one line in, one line out.
///
/// The engine owns a boxed console, so tests can script the input and
/// capture the output instead of touching the process streams.
pub trait Console {
    /// Reads one line from the input, without the trailing newline.
    fn read_line(&mut self) -> io::Result<String>;

    /// Writes one line to the output, appending a newline.
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// Standard input and output.
pub struct StdConsole;

impl Console for StdConsole {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", line)?;
        handle.flush()
    }
}

/// A console with scripted input and recorded output, for driving programs
/// programmatically. Clone the output handle before boxing the console into
/// an engine.
pub struct ScriptConsole {
    input: VecDeque<String>,
    output: Rc<RefCell<Vec<String>>>,
}

impl ScriptConsole {
    pub fn new<I, S>(input: I) -> ScriptConsole
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptConsole {
            input: input.into_iter().map(Into::into).collect(),
            output: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn output(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.output)
    }
}

impl Console for ScriptConsole {
    fn read_line(&mut self) -> io::Result<String> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more scripted input"))
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.output.borrow_mut().push(line.to_string());
        Ok(())
    }
}
