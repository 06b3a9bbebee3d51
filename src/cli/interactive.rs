//! Interactive collection of the user request.

use std::io::{self, BufRead, Write};

use crate::error::RequestError;
use crate::pipeline::{is_help, split_list, TerminalReview};
use crate::search::{DedupeField, UserRequest};

/// Largest accepted quota.
pub const MAX_MIN_ITEMS: usize = 100;

const DESCRIPTION_HELP: &str = "
Enter a concise description of the items you want the system to find.
Example: 'Boston-area robotics companies focused on warehouse automation'.
The description guides all downstream search prompts.
";

const MIN_ITEMS_HELP: &str = "
Provide the minimum number of unique items you need in the final CSV (maximum of 100).
The system keeps searching and refining until at least this many polished
results are produced (or retries are exhausted).
";

const COLUMNS_HELP: &str = "
Optional: specify custom column headers separated by commas.
Example: 'name,website,description,email'. Leave blank to let the system
infer an appropriate schema automatically.
";

/// Request fields already supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct RequestInput {
    pub description: Option<String>,
    pub min_items: Option<usize>,
    pub columns: Vec<String>,
    pub dedupe_field: Option<String>,
}

impl RequestInput {
    /// Optional fields are only asked for when the description is.
    fn is_interactive(&self) -> bool {
        self.description
            .as_deref()
            .map_or(true, |d| d.trim().is_empty())
    }
}

/// Builds the request from `input`, asking on the terminal for whatever is
/// missing. Quotas above [`MAX_MIN_ITEMS`] are capped with a notice.
///
/// # Errors
///
/// Returns an error when the terminal closes or a command-line value is
/// invalid.
pub fn collect_request<R: BufRead, W: Write>(
    terminal: &mut TerminalReview<R, W>,
    input: &RequestInput,
) -> anyhow::Result<UserRequest> {
    let interactive = input.is_interactive();

    let description = match input.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => description.to_string(),
        _ => prompt_description(terminal)?,
    };

    let mut min_items = match input.min_items {
        Some(0) => return Err(RequestError::InvalidMinItems.into()),
        Some(n) => n,
        None => prompt_min_items(terminal)?,
    };
    if min_items > MAX_MIN_ITEMS {
        terminal.say("Minimum number capped at 100; using 100.")?;
        min_items = MAX_MIN_ITEMS;
    }

    let columns = if !input.columns.is_empty() || !interactive {
        input.columns.clone()
    } else {
        prompt_columns(terminal)?
    };

    let request = UserRequest::new(description, min_items)?.with_columns(&columns);

    match &input.dedupe_field {
        Some(raw) => {
            let field: DedupeField = raw.parse()?;
            Ok(request.with_dedupe_field(field)?)
        }
        None if interactive => prompt_dedupe_field(terminal, request),
        None => Ok(request),
    }
}

fn prompt_description<R: BufRead, W: Write>(
    terminal: &mut TerminalReview<R, W>,
) -> io::Result<String> {
    loop {
        let answer = terminal.ask("Describe what you are looking for (type 'help' for guidance): ")?;
        if is_help(&answer) {
            terminal.say(DESCRIPTION_HELP)?;
        } else if !answer.is_empty() {
            return Ok(answer);
        }
    }
}

fn prompt_min_items<R: BufRead, W: Write>(
    terminal: &mut TerminalReview<R, W>,
) -> io::Result<usize> {
    loop {
        let answer = terminal.ask("Minimum number of items (type 'help' for guidance): ")?;
        if is_help(&answer) {
            terminal.say(MIN_ITEMS_HELP)?;
            continue;
        }
        match answer.parse::<i64>() {
            Ok(n) if n > 0 => return Ok(n as usize),
            Ok(_) => terminal.say("Please enter a positive integer.")?,
            Err(_) => terminal.say("Invalid integer, please try again.")?,
        }
    }
}

fn prompt_columns<R: BufRead, W: Write>(
    terminal: &mut TerminalReview<R, W>,
) -> io::Result<Vec<String>> {
    loop {
        let answer = terminal.ask(
            "Optional: comma-separated column names for the CSV (blank to skip, 'help' for guidance): ",
        )?;
        if is_help(&answer) {
            terminal.say(COLUMNS_HELP)?;
            continue;
        }
        return Ok(split_list(&answer));
    }
}

fn prompt_dedupe_field<R: BufRead, W: Write>(
    terminal: &mut TerminalReview<R, W>,
    request: UserRequest,
) -> anyhow::Result<UserRequest> {
    loop {
        let answer = terminal
            .ask("Dedupe column (name/website/link/url/email/description, blank for name): ")?;
        let field = match answer.parse::<DedupeField>() {
            Ok(field) => field,
            Err(_) => {
                terminal.say(
                    "Unknown column. Allowed options: name, website, link, url, email, description.",
                )?;
                continue;
            }
        };
        match request.clone().with_dedupe_field(field) {
            Ok(request) => return Ok(request),
            Err(err) => terminal.say(&err.to_string())?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn terminal(script: &str) -> TerminalReview<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalReview::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_collect_fully_interactive() {
        let mut term = terminal("help\nrobotics firms\nabc\n0\n250\nh\nname, website\nemail\nwebsite\n");
        let request = collect_request(&mut term, &RequestInput::default()).expect("request");

        assert_eq!(request.description, "robotics firms");
        assert_eq!(request.min_items, 100);
        assert_eq!(
            request.columns,
            Some(vec!["name".to_string(), "website".to_string()])
        );
        assert_eq!(request.dedupe_field, DedupeField::Website);

        let text = String::from_utf8(term.into_inner().1).expect("utf8");
        assert!(text.contains("Boston-area robotics companies"));
        assert!(text.contains("Invalid integer, please try again."));
        assert!(text.contains("Please enter a positive integer."));
        assert!(text.contains("Minimum number capped at 100; using 100."));
        assert!(text.contains("Column 'email' is not in the schema"));
    }

    #[test]
    fn test_collect_blank_answers_use_defaults() {
        let mut term = terminal("robotics firms\n5\n\n\n");
        let request = collect_request(&mut term, &RequestInput::default()).expect("request");
        assert_eq!(request.columns, None);
        assert_eq!(request.dedupe_field, DedupeField::Name);
    }

    #[test]
    fn test_collect_from_flags_without_prompting() {
        let input = RequestInput {
            description: Some("robotics firms".to_string()),
            min_items: Some(12),
            columns: vec!["name".to_string(), "email".to_string()],
            dedupe_field: Some("email".to_string()),
        };
        let mut term = terminal("");
        let request = collect_request(&mut term, &input).expect("request");
        assert_eq!(request.min_items, 12);
        assert_eq!(request.dedupe_field, DedupeField::Email);
    }

    #[test]
    fn test_collect_rejects_invalid_flags() {
        let input = RequestInput {
            description: Some("robotics firms".to_string()),
            min_items: Some(5),
            columns: vec!["name".to_string()],
            dedupe_field: Some("website".to_string()),
        };
        let err = collect_request(&mut terminal(""), &input).unwrap_err();
        assert!(err.to_string().contains("website"));

        let input = RequestInput {
            description: Some("robotics firms".to_string()),
            min_items: Some(0),
            ..RequestInput::default()
        };
        assert!(collect_request(&mut terminal(""), &input).is_err());
    }
}
