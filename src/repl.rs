//! Interactive query loop.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::llm::ChatAgent;
use crate::response::render;

/// Typed (in any letter case) to leave the loop.
pub const EXIT_KEYWORD: &str = "quit";

pub fn is_exit_command(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(EXIT_KEYWORD)
}

/// Read queries from `input` until the exit keyword or end of input, sending
/// each one to `agent` and printing the rendered response to `out`.
///
/// Queries are strictly sequential. Agent errors are not handled here and
/// end the loop. Returns the number of queries answered.
pub async fn run<R, W>(agent: &dyn ChatAgent, input: R, out: &mut W) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write + ?Sized,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        write!(out, "\nQuery: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let query = line.trim();

        if is_exit_command(query) {
            break;
        }
        // Chat APIs reject an empty user message with a 400.
        if query.is_empty() {
            continue;
        }

        tracing::debug!(query_length = query.len(), "Submitting query");
        let response = agent.invoke(query).await?;
        answered += 1;

        writeln!(out, "\nResponse:")?;
        writeln!(out, "{}", render(&response))?;
    }

    Ok(answered)
}
