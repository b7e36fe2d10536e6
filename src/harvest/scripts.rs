// src/harvest/scripts.rs

//! Builders for the scripts evaluated inside the remote page.
//!
//! Selectors and labels come from user templates, so every value is embedded
//! as a JSON string literal rather than spliced raw. The scripts themselves
//! never throw: extraction failures inside them degrade to missing fields or
//! empty results.

use crate::models::Template;

/// Quote a value as a JS string literal.
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Quote a list of values as a JS array literal.
fn js_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Script clicking one round of truncation controls for one selector.
///
/// Returns -1 when the page is a detail view (wrong context for list-wide
/// clicking), otherwise the number of controls clicked. Clicked controls are
/// tagged with `data-trawl-expanded` so a repeat pass never re-clicks them.
pub fn expand_script(
    selector: &str,
    labels: &[String],
    quoted_container: Option<&str>,
    detail_marker: Option<&str>,
) -> String {
    let detail_check = match detail_marker {
        Some(marker) => format!(
            "if (window.location.pathname.includes({})) {{ return -1; }}",
            js_str(marker)
        ),
        None => String::new(),
    };
    let quoted_check = match quoted_container {
        Some(container) => format!(
            "if (el.closest({})) {{ return; }}",
            js_str(container)
        ),
        None => String::new(),
    };
    let lowered: Vec<String> = labels.iter().map(|l| l.trim().to_lowercase()).collect();

    format!(
        r#"(function() {{
    {detail_check}
    const labels = {labels};
    const targets = document.querySelectorAll({selector});
    let clicked = 0;
    targets.forEach(el => {{
        if (!el || el.offsetParent === null) {{ return; }}
        if (el.getAttribute('data-trawl-expanded')) {{ return; }}
        {quoted_check}
        if (labels.length > 0) {{
            const text = (el.innerText || el.textContent || '').trim().toLowerCase();
            const aria = (el.getAttribute('aria-label') || '').trim().toLowerCase();
            if (!labels.includes(text) && !labels.includes(aria)) {{ return; }}
        }}
        el.setAttribute('data-trawl-expanded', 'true');
        el.click();
        clicked++;
    }});
    return clicked;
}})()"#,
        detail_check = detail_check,
        labels = js_array(&lowered),
        selector = js_str(selector),
        quoted_check = quoted_check,
    )
}

/// Script extracting every rendered item as `{_index, field: text, ...}`.
///
/// Field values prefer the `datetime` attribute (so `<time>` elements yield
/// machine-readable stamps), then rendered text, then `href`, then
/// `aria-label`. Empty values are omitted.
pub fn extract_script(template: &Template) -> String {
    let fields = serde_json::to_string(&template.fields).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"(function() {{
    const fields = {fields};
    const out = [];
    document.querySelectorAll({item_selector}).forEach((root, index) => {{
        try {{
            const item = {{_index: index}};
            for (const [name, sel] of Object.entries(fields)) {{
                try {{
                    const el = root.querySelector(sel);
                    if (!el) {{ continue; }}
                    let text = el.getAttribute('datetime') || el.innerText || el.textContent || '';
                    if (!text && el.getAttribute('href')) {{ text = el.getAttribute('href'); }}
                    if (!text && el.getAttribute('aria-label')) {{ text = el.getAttribute('aria-label'); }}
                    text = String(text).trim();
                    if (text) {{ item[name] = text; }}
                }} catch (e) {{}}
            }}
            out.push(item);
        }} catch (e) {{}}
    }});
    return out;
}})()"#,
        fields = fields,
        item_selector = js_str(&template.item_selector),
    )
}

/// Script reading raw page geometry for the visibility probe.
///
/// Returns viewport and page measurements plus each rendered item's identity
/// value and vertical span, together with the end-marker and
/// loading-indicator flags, all read in one evaluation so the snapshot is
/// internally consistent.
pub fn probe_script(template: &Template) -> String {
    let identity_selector = template
        .fields
        .get(&template.identity_field)
        .cloned()
        .unwrap_or_default();

    let geometry = match &template.scroll_selector {
        Some(container) => format!(
            r#"const c = document.querySelector({});
    if (!c) {{ return null; }}
    const viewportTop = c.scrollTop;
    const viewportHeight = c.clientHeight;
    const pageHeight = c.scrollHeight;
    const offsetBase = c.scrollTop - c.getBoundingClientRect().top;"#,
            js_str(container)
        ),
        None => r#"const viewportTop = window.pageYOffset;
    const viewportHeight = window.innerHeight;
    const pageHeight = document.body.scrollHeight;
    const offsetBase = window.pageYOffset;"#
            .to_string(),
    };

    format!(
        r#"(function() {{
    {geometry}
    const idSel = {identity_selector};
    const items = [];
    document.querySelectorAll({item_selector}).forEach(root => {{
        try {{
            let key = '';
            const el = idSel ? root.querySelector(idSel) : null;
            if (el) {{
                key = el.getAttribute('datetime') || el.innerText || el.textContent || '';
                if (!key && el.getAttribute('href')) {{ key = el.getAttribute('href'); }}
                if (!key && el.getAttribute('aria-label')) {{ key = el.getAttribute('aria-label'); }}
                key = String(key).trim();
            }}
            const rect = root.getBoundingClientRect();
            items.push({{key: key, top: rect.top + offsetBase, bottom: rect.bottom + offsetBase}});
        }} catch (e) {{}}
    }});
    const anyVisible = (sels) => sels.some(sel => {{
        try {{
            const el = document.querySelector(sel);
            return !!(el && el.offsetParent !== null);
        }} catch (e) {{ return false; }}
    }});
    return {{
        viewport_top: viewportTop,
        viewport_height: viewportHeight,
        page_height: pageHeight,
        items: items,
        end_marker_seen: anyVisible({end_markers}),
        loading_indicator_visible: anyVisible({loading_selectors})
    }};
}})()"#,
        geometry = geometry,
        identity_selector = js_str(&identity_selector),
        item_selector = js_str(&template.item_selector),
        end_markers = js_array(&template.end_markers),
        loading_selectors = js_array(&template.loading_selectors),
    )
}

/// Script capturing pre-scroll measurements and requesting the scroll.
///
/// The post-scroll half runs separately after the settle delay; smooth
/// scrolling and lazy rendering both need that gap to produce honest
/// numbers.
pub fn scroll_begin_script(scroll_selector: Option<&str>) -> String {
    match scroll_selector {
        Some(container) => format!(
            r#"(function() {{
    const c = document.querySelector({});
    if (!c) {{ return null; }}
    const pre = {{pre_offset: c.scrollTop, pre_height: c.scrollHeight, viewport_height: c.clientHeight}};
    c.scrollTop = c.scrollHeight;
    return pre;
}})()"#,
            js_str(container)
        ),
        None => r#"(function() {
    const pre = {pre_offset: window.pageYOffset, pre_height: document.body.scrollHeight, viewport_height: window.innerHeight};
    window.scrollTo({top: document.body.scrollHeight, behavior: 'smooth'});
    return pre;
})()"#
            .to_string(),
    }
}

/// Script reading the settled post-scroll measurements.
pub fn scroll_measure_script(scroll_selector: Option<&str>) -> String {
    match scroll_selector {
        Some(container) => format!(
            r#"(function() {{
    const c = document.querySelector({});
    if (!c) {{ return null; }}
    return {{post_offset: c.scrollTop, post_height: c.scrollHeight}};
}})()"#,
            js_str(container)
        ),
        None => r#"(function() {
    return {post_offset: window.pageYOffset, post_height: document.body.scrollHeight};
})()"#
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::presets;

    #[test]
    fn selectors_are_embedded_as_quoted_literals() {
        let script = expand_script(r#"a[href*="/status/"]"#, &[], None, None);
        // The inner quotes must arrive escaped, not raw.
        assert!(script.contains(r#""a[href*=\"/status/\"]""#));
        assert!(!script.contains("return -1"));
    }

    #[test]
    fn expand_script_checks_detail_context_when_configured() {
        let script = expand_script(
            ".more",
            &["show more".to_string()],
            Some(".quoted"),
            Some("/status/"),
        );
        assert!(script.contains("return -1"));
        assert!(script.contains(r#"window.location.pathname.includes("/status/")"#));
        assert!(script.contains(r#"el.closest(".quoted")"#));
        assert!(script.contains(r#"["show more"]"#));
        assert!(script.contains("data-trawl-expanded"));
    }

    #[test]
    fn expand_script_lowercases_labels() {
        let script = expand_script(".more", &["Show More ".to_string()], None, None);
        assert!(script.contains(r#"["show more"]"#));
    }

    #[test]
    fn extract_script_preserves_field_order() {
        let template = presets::twitter(None);
        let script = extract_script(&template);
        let id_pos = script.find(r#""id":"#).unwrap();
        let text_pos = script.find(r#""text":"#).unwrap();
        let retweets_pos = script.find(r#""retweets":"#).unwrap();
        assert!(id_pos < text_pos && text_pos < retweets_pos);
        assert!(script.contains("_index"));
    }

    #[test]
    fn probe_script_uses_window_geometry_by_default() {
        let template = presets::twitter(None);
        let script = probe_script(&template);
        assert!(script.contains("window.pageYOffset"));
        assert!(script.contains("end_marker_seen"));
        assert!(script.contains(r#"div[role=\"progressbar\"]"#));
    }

    #[test]
    fn scroll_scripts_target_the_container_when_set() {
        let begin = scroll_begin_script(Some("#feed"));
        assert!(begin.contains(r##"document.querySelector("#feed")"##));
        assert!(begin.contains("c.scrollTop = c.scrollHeight"));

        let measure = scroll_measure_script(Some("#feed"));
        assert!(measure.contains("post_offset"));

        let window_begin = scroll_begin_script(None);
        assert!(window_begin.contains("behavior: 'smooth'"));
    }
}
