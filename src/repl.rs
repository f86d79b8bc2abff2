use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::session::Session;

pub const PROMPT: &str = ">> ";

/// Reads lines until EOF or interrupt, evaluating each against one session.
pub fn start(mut session: Session) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let input = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };

        if input.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(input.as_str())?;

        println!("{}", eval_line(&mut session, &input));
    }

    Ok(())
}

/// Evaluates one line and renders what the REPL prints for it.
pub fn eval_line(session: &mut Session, input: &str) -> String {
    match session.eval(input) {
        Ok(value) => value.to_string(),
        Err(err) => err.to_string(),
    }
}
