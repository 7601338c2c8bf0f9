//! Interactive PKCE login.
//!
//! The flow is a one-shot operation run from the CLI, never from the request
//! path: open the provider's login page, let the operator copy the `code`
//! from the intercepted callback, exchange it once.

use std::io::{BufRead, Write};

use super::pkce::{generate_pkce_pair, CHALLENGE_METHOD};
use super::token_exchange::{AuthError, TokenEndpoint};
use crate::storage::TokenPair;

pub const LOGIN_URL: &str = "https://app-api.pixiv.net/web/v1/login";
const LOGIN_CLIENT: &str = "pixiv-android";

const INSTRUCTIONS: &str = "\
Instructions:
1. In the page just opened in your web browser, open the dev console (F12) and switch to the network tab.
2. Enable persistent logging (\"Preserve log\").
3. Type into the filter field: callback?
4. Proceed with the pixiv login.
5. After logging in you should see a blank page and a request that looks like this:

   https://app-api.pixiv.net/web/v1/users/auth/pixiv/callback?state=...&code=...

   Copy the value of the code param into the prompt below and hit Enter.

WARNING: the code expires within seconds. If the exchange fails, start over from step 1.";

/// A started login waiting for the operator's authorization code.
///
/// Holds the PKCE verifier; [`PendingLogin::exchange`] consumes it so the
/// verifier can be sent at most once.
pub struct PendingLogin {
    code_verifier: String,
    login_url: String,
}

impl PendingLogin {
    pub fn start() -> Self {
        let pkce = generate_pkce_pair();
        let login_url = build_login_url(&pkce.code_challenge);
        Self {
            code_verifier: pkce.code_verifier,
            login_url,
        }
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub async fn exchange(
        self,
        endpoint: &TokenEndpoint,
        code: &str,
    ) -> Result<TokenPair, AuthError> {
        endpoint.exchange_code(code, &self.code_verifier).await
    }
}

fn build_login_url(code_challenge: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", CHALLENGE_METHOD)
        .append_pair("client", LOGIN_CLIENT)
        .finish();
    format!("{LOGIN_URL}?{query}")
}

/// Run the full interactive login against `input`/`output`.
///
/// Optionally opens the login page in the default browser, always prints the
/// URL and instructions, reads one line as the authorization code and
/// exchanges it. An empty line or EOF cancels.
pub async fn run_interactive<R: BufRead, W: Write>(
    endpoint: &TokenEndpoint,
    mut input: R,
    mut output: W,
    launch_browser: bool,
) -> Result<TokenPair, AuthError> {
    let pending = PendingLogin::start();

    if launch_browser {
        if let Err(e) = open::that(pending.login_url()) {
            tracing::warn!(error = %e, "Failed to open browser, use the printed URL");
        }
    }
    writeln!(output, "Login URL: {}\n", pending.login_url())?;
    writeln!(output, "{INSTRUCTIONS}\n")?;
    write!(output, "code: ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(AuthError::Cancelled);
    }
    let code = line.trim();
    if code.is_empty() {
        return Err(AuthError::Cancelled);
    }

    tracing::info!("Exchanging authorization code");
    pending.exchange(endpoint, code).await
}
