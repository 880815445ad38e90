//! Line-based command interpreter.
//!
//! # Responsibility
//! - Parse one command per line and call the console service.
//! - Print results and argument errors in the classic `** ... **` format.
//!
//! # Invariants
//! - Argument checks run in order: kind, kind exists, id, record exists,
//!   attribute name, value.
//! - Store failures are printed and never end the session.

use hbnb_core::{ConsoleService, RecordStore, ServiceError};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead, Write};

const PROMPT: &str = "(hbnb) ";

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|(\S+)"#).expect("valid token regex"));

const HELP_LINES: &[&str] = &[
    "create <Kind>                          create and save a record, print its id",
    "show <Kind> <id>                       print one record",
    "destroy <Kind> <id>                    delete one record",
    "all [Kind]                             print every record, or every record of a kind",
    "count [Kind]                           count records",
    "update <Kind> <id> <field> <value>     set one attribute",
    "quit                                   exit the console",
];

/// Whether the loop keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Splits a command line on whitespace; `"double quoted"` tokens keep spaces.
pub fn tokenize(line: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|token| token.as_str().to_string())
        .collect()
}

/// Interactive console bound to one service, reader and writer.
pub struct Console<S: RecordStore, R: BufRead, W: Write> {
    service: ConsoleService<S>,
    input: R,
    output: W,
    show_prompt: bool,
}

impl<S: RecordStore, R: BufRead, W: Write> Console<S, R, W> {
    pub fn new(service: ConsoleService<S>, input: R, output: W) -> Self {
        Self {
            service,
            input,
            output,
            show_prompt: false,
        }
    }

    /// Prints the prompt before each line (interactive sessions only).
    pub fn with_prompt(mut self, show_prompt: bool) -> Self {
        self.show_prompt = show_prompt;
        self
    }

    /// Reads and executes lines until `quit` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        let mut line = String::new();
        loop {
            if self.show_prompt {
                write!(self.output, "{PROMPT}")?;
                self.output.flush()?;
            }

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return self.execute("EOF").map(|_| ());
            }
            if self.execute(line.trim())? == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Executes one command line.
    pub fn execute(&mut self, line: &str) -> io::Result<Flow> {
        let tokens = tokenize(line);
        let Some((command, args)) = tokens.split_first() else {
            return Ok(Flow::Continue);
        };

        match command.as_str() {
            "quit" => return Ok(Flow::Exit),
            "EOF" => {
                writeln!(self.output)?;
                return Ok(Flow::Exit);
            }
            "help" => {
                for help in HELP_LINES {
                    writeln!(self.output, "{help}")?;
                }
            }
            "create" => self.do_create(args)?,
            "show" => self.do_show(args)?,
            "destroy" => self.do_destroy(args)?,
            "all" => self.do_all(args)?,
            "count" => self.do_count(args)?,
            "update" => self.do_update(args)?,
            _ => writeln!(self.output, "*** Unknown syntax: {line}")?,
        }
        Ok(Flow::Continue)
    }

    fn do_create(&mut self, args: &[String]) -> io::Result<()> {
        let Some(kind) = self.require_kind(args)? else {
            return Ok(());
        };
        match self.service.create(&kind) {
            Ok(id) => writeln!(self.output, "{id}"),
            Err(err) => self.report(err),
        }
    }

    fn do_show(&mut self, args: &[String]) -> io::Result<()> {
        let Some((kind, id)) = self.require_record(args)? else {
            return Ok(());
        };
        match self.service.show(&kind, &id) {
            Ok(rendered) => writeln!(self.output, "{rendered}"),
            Err(err) => self.report(err),
        }
    }

    fn do_destroy(&mut self, args: &[String]) -> io::Result<()> {
        let Some((kind, id)) = self.require_record(args)? else {
            return Ok(());
        };
        match self.service.destroy(&kind, &id) {
            Ok(()) => Ok(()),
            Err(err) => self.report(err),
        }
    }

    fn do_all(&mut self, args: &[String]) -> io::Result<()> {
        let kind = args.first().map(String::as_str);
        match self.service.list(kind) {
            Ok(rendered) => {
                for item in rendered {
                    writeln!(self.output, "{item}")?;
                }
                Ok(())
            }
            Err(err) => self.report(err),
        }
    }

    fn do_count(&mut self, args: &[String]) -> io::Result<()> {
        let kind = args.first().map(String::as_str);
        match self.service.count(kind) {
            Ok(count) => writeln!(self.output, "{count}"),
            Err(err) => self.report(err),
        }
    }

    fn do_update(&mut self, args: &[String]) -> io::Result<()> {
        let Some((kind, id)) = self.require_record(args)? else {
            return Ok(());
        };
        let Some(field) = args.get(2) else {
            return writeln!(self.output, "** attribute name missing **");
        };
        let Some(value) = args.get(3) else {
            return writeln!(self.output, "** value missing **");
        };
        match self.service.update(&kind, &id, field, value) {
            Ok(()) => Ok(()),
            Err(err) => self.report(err),
        }
    }

    /// Checks the kind argument; prints the matching error and returns `None`
    /// when it is missing or unknown.
    fn require_kind(&mut self, args: &[String]) -> io::Result<Option<String>> {
        let Some(kind) = args.first() else {
            writeln!(self.output, "** class name missing **")?;
            return Ok(None);
        };
        if !self.service.has_kind(kind) {
            writeln!(self.output, "** class doesn't exist **")?;
            return Ok(None);
        }
        Ok(Some(kind.clone()))
    }

    fn require_record(&mut self, args: &[String]) -> io::Result<Option<(String, String)>> {
        let Some(kind) = self.require_kind(args)? else {
            return Ok(None);
        };
        let Some(id) = args.get(1) else {
            writeln!(self.output, "** instance id missing **")?;
            return Ok(None);
        };
        if !self.service.exists(&kind, id) {
            writeln!(self.output, "** no instance found **")?;
            return Ok(None);
        }
        Ok(Some((kind, id.clone())))
    }

    fn report(&mut self, err: ServiceError) -> io::Result<()> {
        match err {
            ServiceError::UnknownKind(_) => writeln!(self.output, "** class doesn't exist **"),
            ServiceError::NotFound { .. } => writeln!(self.output, "** no instance found **"),
            ServiceError::UnknownAttribute { kind, field } => {
                writeln!(self.output, "** {kind} does not contain attribute '{field}' **")
            }
            ServiceError::ProtectedAttribute(field) => {
                writeln!(self.output, "** attribute '{field}' cannot be updated **")
            }
            ServiceError::InvalidValue { field, source } => {
                writeln!(self.output, "** invalid value for '{field}': {source} **")
            }
            ServiceError::Store(err) => {
                warn!("event=console_command module=cli status=error error={err}");
                writeln!(self.output, "** {err} **")
            }
        }
    }
}
