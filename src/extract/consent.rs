//! Consent-banner dismissal strategies
//!
//! Strategies are plain data so they can live in the config file and travel
//! to worker processes. The rendering context turns them into a script that
//! searches the page and its same-origin iframes.

use serde::{Deserialize, Serialize};

/// One way of locating a consent button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStrategy {
    /// A CSS selector, e.g. `#onetrust-accept-btn-handler`
    Selector(String),
    /// An element whose own text contains this string (case-insensitive)
    Text(String),
}

impl ConsentStrategy {
    /// The built-in strategy list
    pub fn defaults() -> Vec<ConsentStrategy> {
        let selectors = [
            "#accept",
            "#cookie-accept",
            "#onetrust-accept-btn-handler",
            ".accept-cookies",
            ".cookie-consent-accept",
        ];
        let texts = ["Accept", "I agree", "Allow all", "Got it"];

        selectors
            .iter()
            .map(|s| ConsentStrategy::Selector(s.to_string()))
            .chain(texts.iter().map(|t| ConsentStrategy::Text(t.to_string())))
            .collect()
    }
}

const CONSENT_SCRIPT: &str = r#"(() => {
  const strategies = __STRATEGIES__;
  const mode = "__MODE__";
  const docs = [document];
  for (const frame of document.querySelectorAll("iframe")) {
    try {
      if (frame.contentDocument) docs.push(frame.contentDocument);
    } catch (e) {}
  }
  const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  const ownText = (el) => Array.from(el.childNodes)
    .filter((n) => n.nodeType === 3)
    .map((n) => n.textContent)
    .join(" ")
    .toLowerCase();
  const candidates = (doc, s) => {
    if (s.selector !== undefined) {
      try { return Array.from(doc.querySelectorAll(s.selector)); } catch (e) { return []; }
    }
    const needle = s.text.toLowerCase();
    if (!doc.body) return [];
    return Array.from(doc.body.querySelectorAll("*")).filter((el) => ownText(el).includes(needle));
  };
  for (const doc of docs) {
    for (const s of strategies) {
      for (const el of candidates(doc, s)) {
        if (!visible(el)) continue;
        if (mode === "present") return true;
        try { el.click(); return true; } catch (e) {}
      }
    }
  }
  return false;
})()"#;

fn render_script(strategies: &[ConsentStrategy], mode: &str) -> String {
    let encoded = serde_json::to_string(strategies).unwrap_or_else(|_| "[]".to_string());
    CONSENT_SCRIPT
        .replace("__STRATEGIES__", &encoded)
        .replace("__MODE__", mode)
}

/// Script that clicks the first visible match and evaluates to true if it did
pub fn click_script(strategies: &[ConsentStrategy]) -> String {
    render_script(strategies, "click")
}

/// Script that evaluates to true while any strategy still matches something visible
pub fn presence_script(strategies: &[ConsentStrategy]) -> String {
    render_script(strategies, "present")
}
