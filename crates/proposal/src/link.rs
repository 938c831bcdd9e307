//! Shareable review links.
//!
//! A link is the editor's base URL with three query parameters:
//! `dandiset` (the dandiset identifier), `review=true`, and `proposal`
//! (the encoded token).

use crate::codec::{Proposal, decode};
use crate::error::LinkError;
use tracing::debug;
use url::Url;

/// A decoded review link.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalLink {
    pub dandiset: Option<String>,
    pub review: bool,
    pub proposal: Proposal,
}

/// Build a review link for `proposal` on top of `base`.
pub fn build_link(base: &str, dandiset: &str, proposal: &Proposal) -> Result<Url, LinkError> {
    let mut url = Url::parse(base)?;
    let token = proposal.to_token()?;
    url.query_pairs_mut()
        .append_pair("dandiset", dandiset)
        .append_pair("review", "true")
        .append_pair("proposal", &token);
    Ok(url)
}

/// Extract the proposal from a link.
///
/// Returns `None` ("no proposal") when the link does not parse, has no
/// `proposal` parameter, or the token does not decode.
pub fn parse_link(link: &str) -> Option<ProposalLink> {
    let url = Url::parse(link.trim())
        .inspect_err(|e| debug!(error = %e, "Not a URL"))
        .ok()?;

    let mut dandiset = None;
    let mut review = false;
    let mut token = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "dandiset" => dandiset = Some(value.into_owned()),
            "review" => review = matches!(value.as_ref(), "true" | "1"),
            "proposal" => token = Some(value.into_owned()),
            _ => {}
        }
    }

    let proposal = decode(&token?)?;
    Some(ProposalLink {
        dandiset,
        review,
        proposal,
    })
}
