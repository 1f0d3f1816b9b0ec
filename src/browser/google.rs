//! Google Forms DOM specifics: selector ladders, click scripts, and the
//! text patterns that identify confirmation and closed states.
//!
//! The rendered DOM of these forms is obfuscated and shifts between form
//! variants, so every lookup is a ladder of candidates tried in order, from
//! the most specific selector down to role-based fallbacks.

use regex::Regex;

/// Candidate selectors for the 姓名 (name) text input.
pub const NAME_SELECTORS: [&str; 5] = [
    "input.whsOnd[aria-labelledby]",
    "input.whsOnd",
    "input[aria-label='姓名']",
    "input[role='textbox']",
    "div[role='textbox']",
];

/// Candidate selectors for the reason textarea. When several match, the
/// last element on the page is the one below the choice question.
pub const REASON_SELECTORS: [&str; 5] = [
    "textarea.KHxj8b.tL9Q4c",
    "textarea[jsname='YPqjbf']",
    "textarea[aria-label='您的回答']",
    "textarea[required]",
    "textarea",
];

/// The radio option selected on every form.
pub const LEAVE_RADIO_SELECTOR: &str = "div[role='radio'][aria-label='休假']";

/// Page text fragments that mean the form has stopped accepting responses.
const CLOSED_PHRASES: [&str; 7] = [
    "不接受回應",
    "不再接受回應",
    "已停止接受回應",
    "停止接受回應",
    "不接受填寫",
    "已關閉",
    "劃假已滿，如有相關問題可聯繫班次主管與排班組。",
];

/// True once the URL shows the post-submit confirmation redirect.
pub fn is_confirmation_url(url: &str) -> bool {
    // Compiled per call; this runs a handful of times per attempt.
    let pattern =
        Regex::new(r"formResponse|/thankyou|viewform\?edit2=").expect("static pattern compiles");
    pattern.is_match(url)
}

/// First closed-form phrase present in the page HTML, if any.
pub fn closed_phrase_in(html: &str) -> Option<&'static str> {
    CLOSED_PHRASES.iter().copied().find(|p| html.contains(p))
}

/// Expression that is true once the form body and its first input exist.
pub fn form_ready_expression() -> &'static str {
    r#"!!document.querySelector("form")
        && !!document.querySelector("input.whsOnd, input[role='textbox'], div[role='textbox']")"#
}

/// Script that clicks the 休假 radio and reports whether it took. The
/// Sunday form variant carries no aria-label or data-value on its radios,
/// so it is located through its radiogroup text instead.
pub fn click_leave_radio_script(sunday_variant: bool) -> String {
    let locate = if sunday_variant {
        r#"
        const groups = Array.from(document.querySelectorAll("div[role='radiogroup']"));
        const group = groups.find(g => (g.textContent || '').includes('星期日')) || groups[0];
        const radio = group && group.querySelector("div[role='radio']");
        "#
    } else {
        r#"
        const radio = document.querySelector("div[role='radio'][aria-label='休假']");
        "#
    };
    format!(
        r#"(() => {{
        {locate}
        if (!radio) return false;
        radio.scrollIntoView({{ block: 'center' }});
        radio.click();
        return radio.getAttribute('aria-checked') === 'true';
    }})()"#
    )
}

/// Script that clicks the submit button by its label text. Returns false
/// when no candidate button exists on the page.
pub fn click_submit_script() -> &'static str {
    r#"(() => {
        const labels = ['提交', '送出', 'Submit'];
        const buttons = Array.from(document.querySelectorAll("div[role='button']"));
        const hit = buttons.find(b => labels.some(t => (b.textContent || '').includes(t)));
        if (!hit) return false;
        hit.scrollIntoView({ block: 'center' });
        hit.click();
        return true;
    })()"#
}
