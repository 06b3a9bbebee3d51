//! Plan review: the human (or scripted) checkpoint between selection and
//! execution.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::search::SearchPlan;

/// Outcome of one review cycle.
///
/// At most one of `approve`, `regenerate` and `refilter` is set. Drop/add
/// edits may accompany any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewDecision {
    pub approve: bool,
    pub drop_ids: Vec<String>,
    pub new_queries: Vec<String>,
    pub feedback: Option<String>,
    pub regenerate: bool,
    pub refilter: bool,
    pub filter_feedback: Option<String>,
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self {
            approve: true,
            ..Self::default()
        }
    }

    /// Discard the candidates and generate new ones with this feedback.
    pub fn regenerate(feedback: impl Into<String>) -> Self {
        Self {
            regenerate: true,
            feedback: Some(feedback.into()),
            ..Self::default()
        }
    }

    /// Re-run plan selection over the current candidates.
    pub fn refilter(filter_feedback: Option<String>) -> Self {
        Self {
            refilter: true,
            filter_feedback,
            ..Self::default()
        }
    }

    pub fn with_drop_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_new_queries<I, S>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.new_queries.extend(queries.into_iter().map(Into::into));
        self
    }

    pub fn has_edits(&self) -> bool {
        !self.drop_ids.is_empty() || !self.new_queries.is_empty()
    }
}

/// Where plans are reviewed and run status is reported.
pub trait ReviewSurface: Send {
    /// Reviews `plan` and returns one terminal decision.
    fn review_plan(&mut self, plan: &SearchPlan) -> io::Result<ReviewDecision>;

    /// Shows a user-facing status line.
    fn display_status(&mut self, message: &str);
}

const MENU: &str = "Options: [A]pprove plan, [D]rop IDs, [N]ew search, \
[F]eedback, [G] Re-filter with feedback, [R]efresh, [H]elp";

const REVIEW_HELP: &str = "
[A]pprove: accept the current plan and run the searches.
[D]rop: remove one or more tasks by ID (comma-separated).
[N]ew: add an extra search query; the system assigns a new ID and uses
       the 'web' strategy.
[F]eedback: share guidance and regenerate the candidate searches.
[G] Re-filter: add feedback for the filter step and rebuild the plan immediately.
[R]efresh: redisplay the current plan without making changes.
[H]elp: show this menu again.
";

/// Line-oriented terminal review over any reader/writer pair.
pub struct TerminalReview<R, W> {
    input: R,
    output: W,
}

impl TerminalReview<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalReview<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `prompt` and reads one trimmed line.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` when the input is closed.
    pub fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed",
            ));
        }
        Ok(line.trim().to_string())
    }

    pub fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{}", text)
    }

    fn show_plan(&mut self, plan: &SearchPlan) -> io::Result<()> {
        writeln!(self.output, "\nCurrent search plan:")?;
        for task in plan.tasks() {
            let rationale = task
                .rationale
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default();
            writeln!(
                self.output,
                "  [{}] {}: {}{}",
                task.id, task.strategy, task.query, rationale
            )?;
        }
        writeln!(self.output)
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

/// Splits a comma-separated answer into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// True for `help`, `h` and `?`, case-insensitively.
pub fn is_help(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "help" | "h" | "?")
}

impl<R, W> ReviewSurface for TerminalReview<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn review_plan(&mut self, plan: &SearchPlan) -> io::Result<ReviewDecision> {
        let mut shown = plan.clone();
        let mut edits = ReviewDecision::default();

        loop {
            self.show_plan(&shown)?;
            self.say(MENU)?;
            let choice = self.ask("Select an option: ")?.to_lowercase();
            match choice.as_str() {
                "a" | "approve" => {
                    return Ok(ReviewDecision {
                        approve: true,
                        ..edits
                    });
                }
                "d" | "drop" => {
                    let ids = split_list(&self.ask("Enter IDs to drop (comma-separated): ")?);
                    shown.remove_ids(&ids);
                    edits.drop_ids.extend(ids);
                }
                "n" | "new" | "add" => {
                    let query = self.ask("Enter the new search query: ")?;
                    if !query.is_empty() {
                        self.say(&format!("Added new search query: {}", query))?;
                        edits.new_queries.push(query);
                    }
                }
                "f" | "feedback" => {
                    let feedback = self.ask("Enter feedback for the system: ")?;
                    if !feedback.is_empty() {
                        return Ok(ReviewDecision {
                            regenerate: true,
                            feedback: Some(feedback),
                            ..edits
                        });
                    }
                }
                "g" | "refilter" => {
                    let filter_feedback = self.ask("Enter feedback specifically for filtering: ")?;
                    return Ok(ReviewDecision {
                        refilter: true,
                        filter_feedback: Some(filter_feedback).filter(|f| !f.is_empty()),
                        ..edits
                    });
                }
                answer if is_help(answer) => self.say(REVIEW_HELP)?,
                _ => {}
            }
        }
    }

    fn display_status(&mut self, message: &str) {
        // A closed stdout must not abort the run.
        let _ = writeln!(self.output, "[status] {}", message);
    }
}

/// Shared log of status lines shown by a [`ScriptedReview`].
pub type StatusLog = Arc<Mutex<Vec<String>>>;

/// Non-interactive review: replays queued decisions, then approves.
#[derive(Debug, Default)]
pub struct ScriptedReview {
    decisions: VecDeque<ReviewDecision>,
    statuses: StatusLog,
    reviewed: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedReview {
    /// Approves every plan unchanged.
    pub fn auto_approve() -> Self {
        Self::default()
    }

    pub fn with_decisions(decisions: impl IntoIterator<Item = ReviewDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Handle to the status lines displayed so far.
    pub fn status_log(&self) -> StatusLog {
        Arc::clone(&self.statuses)
    }

    /// Handle to the task ids of every plan reviewed so far.
    pub fn reviewed_plans(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
        Arc::clone(&self.reviewed)
    }
}

impl ReviewSurface for ScriptedReview {
    fn review_plan(&mut self, plan: &SearchPlan) -> io::Result<ReviewDecision> {
        if let Ok(mut reviewed) = self.reviewed.lock() {
            reviewed.push(plan.ids());
        }
        Ok(self
            .decisions
            .pop_front()
            .unwrap_or_else(ReviewDecision::approve))
    }

    fn display_status(&mut self, message: &str) {
        info!(status = message, "Run status");
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchTask;
    use std::io::Cursor;

    fn plan() -> SearchPlan {
        SearchPlan::from_tasks([
            SearchTask::new("g0001", "robotics startups boston", "web"),
            SearchTask::new("g0002", "warehouse automation news", "news")
                .with_rationale("recent coverage"),
        ])
    }

    fn terminal(script: &str) -> TerminalReview<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalReview::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    fn output(review: TerminalReview<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(review.into_inner().1).expect("utf8")
    }

    #[test]
    fn test_terminal_approve_with_edits() {
        let mut review = terminal("d\ng0002, g0009\nn\nrobot arms\nn\n\na\n");
        let decision = review.review_plan(&plan()).expect("decision");

        assert!(decision.approve);
        assert!(!decision.regenerate && !decision.refilter);
        assert_eq!(decision.drop_ids, vec!["g0002", "g0009"]);
        assert_eq!(decision.new_queries, vec!["robot arms"]);

        let text = output(review);
        assert!(text.contains("[g0002] news: warehouse automation news (recent coverage)"));
        assert!(text.contains("Added new search query: robot arms"));
        // The plan shown after the drop no longer lists g0002.
        let last_plan = text.rsplit("Current search plan:").next().expect("plan");
        assert!(!last_plan.contains("g0002"));
    }

    #[test]
    fn test_terminal_feedback_requires_text() {
        let mut review = terminal("f\n\nF\nfocus on startups\n");
        let decision = review.review_plan(&plan()).expect("decision");
        assert!(decision.regenerate);
        assert_eq!(decision.feedback.as_deref(), Some("focus on startups"));
    }

    #[test]
    fn test_terminal_refilter_and_help() {
        let mut review = terminal("h\nx\nr\ng\n\n");
        let decision = review.review_plan(&plan()).expect("decision");
        assert!(decision.refilter);
        assert_eq!(decision.filter_feedback, None);
        assert!(output(review).contains("[R]efresh: redisplay"));
    }

    #[test]
    fn test_terminal_eof_is_error() {
        let mut review = terminal("d\n");
        let err = review.review_plan(&plan()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_terminal_status_line() {
        let mut review = terminal("");
        review.display_status("Collected 3 items (target: 5).");
        assert_eq!(output(review), "[status] Collected 3 items (target: 5).\n");
    }

    #[test]
    fn test_scripted_review_replays_then_approves() {
        let mut review = ScriptedReview::with_decisions([
            ReviewDecision::refilter(Some("prefer news".to_string())),
            ReviewDecision::regenerate("more startups").with_drop_ids(["g0001"]),
        ]);
        let reviewed = review.reviewed_plans();

        assert!(review.review_plan(&plan()).expect("first").refilter);
        let second = review.review_plan(&plan()).expect("second");
        assert!(second.regenerate);
        assert!(second.has_edits());
        assert!(review.review_plan(&plan()).expect("third").approve);
        assert_eq!(reviewed.lock().expect("lock").len(), 3);
    }

    #[test]
    fn test_scripted_review_records_status() {
        let mut review = ScriptedReview::auto_approve();
        let log = review.status_log();
        review.display_status("Retry round 1...");
        assert_eq!(*log.lock().expect("lock"), vec!["Retry round 1...".to_string()]);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(split_list(" a, ,b "), vec!["a", "b"]);
        assert!(is_help("HELP"));
        assert!(is_help("?"));
        assert!(!is_help("approve"));
    }
}
