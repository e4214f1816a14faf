//! Terminal-driven authorization: show the URL, read back the redirect.
//!
//! No local HTTP listener is run. The provider redirects the browser to the
//! native-client page, and the user pastes that page's full URL back into the
//! terminal. This is the only place the acquisition waits for a human, and it
//! waits without a timeout.

use async_trait::async_trait;
use oauth2_token_types::{AuthResponse, Authorizer, TokenError, error::Result};
use std::io::{self, BufRead as _};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};
use tokio::sync::{Mutex, oneshot};

/// Parse the query string of a pasted redirect URL.
///
/// Values are percent-decoded, a `#fragment` is ignored, and on duplicate keys
/// the last occurrence wins.
///
/// # Errors
///
/// Returns [`TokenError::MalformedResponse`] if the input has no query component
/// or the query cannot be decoded.
pub fn parse_redirect_response(input: &str) -> Result<AuthResponse> {
    let (_, query) = input.trim().split_once('?').ok_or_else(|| {
        TokenError::MalformedResponse("pasted URL has no query component".into())
    })?;
    let query = query.split_once('#').map_or(query, |(q, _)| q);
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|e| TokenError::MalformedResponse(format!("invalid query string: {e}")))?;
    Ok(pairs.into_iter().collect())
}

/// Where the pasted redirect line is read from.
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Next line of input, or `None` once the input is closed.
    async fn next_line(&self) -> io::Result<Option<String>>;
}

/// The process's standard input, read on a dedicated thread.
///
/// Runtime shutdown waits for blocking-pool tasks such as `tokio::io::stdin`
/// reads. A detached thread does not, so an interrupted prompt lets the
/// process exit.
#[derive(Debug, Default)]
pub struct StdinLines;

#[async_trait]
impl LineSource for StdinLines {
    async fn next_line(&self) -> io::Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("stdin-line".into())
            .spawn(move || {
                let mut line = String::new();
                let read = io::stdin()
                    .lock()
                    .read_line(&mut line)
                    .map(|n| (n > 0).then_some(line));
                drop(tx.send(read));
            })?;
        rx.await
            .map_err(|_| io::Error::other("stdin reader thread exited"))?
    }
}

/// Any async buffered reader, one line per call.
pub struct ReaderLines<R>(Mutex<R>);

#[async_trait]
impl<R> LineSource for ReaderLines<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = self.0.lock().await.read_line(&mut line).await?;
        Ok((read > 0).then_some(line))
    }
}

/// [`Authorizer`] that prompts on stderr and reads one line of input.
pub struct TerminalAuthorizer<L = StdinLines> {
    input: L,
    open_browser: bool,
}

impl TerminalAuthorizer {
    /// Read the response from the process's standard input.
    #[must_use]
    pub fn stdin(open_browser: bool) -> Self {
        Self {
            input: StdinLines,
            open_browser,
        }
    }
}

impl<R> TerminalAuthorizer<ReaderLines<R>> {
    #[must_use]
    pub fn from_reader(input: R, open_browser: bool) -> Self {
        Self {
            input: ReaderLines(Mutex::new(input)),
            open_browser,
        }
    }
}

#[async_trait]
impl<L: LineSource> Authorizer for TerminalAuthorizer<L> {
    async fn authorize(&self, auth_uri: &str) -> Result<AuthResponse> {
        eprintln!();
        eprintln!("Please open the following URL in a browser...");
        eprintln!();
        eprintln!("    {auth_uri}");
        eprintln!();
        eprintln!("...and follow the instructions. Once done, it will lead you to an empty page.");
        eprintln!("Copy the complete URL of that page from the browser address bar,");
        eprintln!("paste it here and press Enter:");
        if self.open_browser {
            open_browser(auth_uri);
        }

        let line = self
            .input
            .next_line()
            .await
            .map_err(|e| TokenError::MalformedResponse(format!("cannot read input: {e}")))?
            .ok_or_else(|| {
                TokenError::MalformedResponse(
                    "input closed before a redirect URL was entered".into(),
                )
            })?;
        parse_redirect_response(&line)
    }
}

fn open_browser(url: &str) {
    if let Err(e) = open::that(url) {
        tracing::warn!(error = %e, "failed to open browser automatically");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_redirect() {
        let resp = parse_redirect_response(
            "https://login.microsoftonline.com/common/oauth2/nativeclient?code=0.AQk&state=xyz&session_state=s",
        )
        .unwrap();
        assert_eq!(resp.get("code"), Some("0.AQk"));
        assert_eq!(resp.get("state"), Some("xyz"));
        assert_eq!(resp.len(), 3);
    }

    #[test]
    fn test_parse_without_query_is_malformed() {
        let err =
            parse_redirect_response("https://login.microsoftonline.com/common/oauth2/nativeclient")
                .unwrap_err();
        assert!(matches!(err, TokenError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_duplicate_key_last_wins() {
        let resp = parse_redirect_response("https://x/cb?code=one&code=two").unwrap();
        assert_eq!(resp.get("code"), Some("two"));
    }

    #[test]
    fn test_parse_decodes_and_drops_fragment() {
        let resp = parse_redirect_response("  https://x/cb?code=a%2Bb&state=s#frag\n").unwrap();
        assert_eq!(resp.get("code"), Some("a+b"));
        assert_eq!(resp.get("state"), Some("s"));
    }

    #[test]
    fn test_parse_empty_query() {
        let resp = parse_redirect_response("https://x/cb?").unwrap();
        assert!(resp.is_empty());
    }

    #[tokio::test]
    async fn test_authorize_reads_one_line() {
        let input: &[u8] = b"https://x/cb?code=abc&state=st\nignored second line\n";
        let authorizer = TerminalAuthorizer::from_reader(input, false);
        let resp = authorizer.authorize("https://login.example/authorize").await.unwrap();
        assert_eq!(resp.get("code"), Some("abc"));
    }

    #[tokio::test]
    async fn test_authorize_closed_input() {
        let input: &[u8] = b"";
        let authorizer = TerminalAuthorizer::from_reader(input, false);
        let err = authorizer.authorize("https://login.example/authorize").await.unwrap_err();
        assert!(err.to_string().contains("input closed"));
    }

    #[tokio::test]
    async fn test_authorize_waits_for_input() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let authorizer = TerminalAuthorizer::from_reader(tokio::io::BufReader::new(reader), false);
        let pending = authorizer.authorize("https://login.example/authorize");
        tokio::pin!(pending);

        tokio::select! {
            _ = &mut pending => panic!("returned before any input"),
            () = tokio::task::yield_now() => {}
        }
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"https://x/cb?code=late\n")
            .await
            .unwrap();
        assert_eq!(pending.await.unwrap().get("code"), Some("late"));
    }
}
