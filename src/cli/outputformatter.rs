use std::io::IsTerminal;

use terminal_size::{terminal_size, Width};

use crate::identity::{SessionSnapshot, TwoFactorSetup, UserProfile};

// Render a two-column field/value table sized to the terminal.
pub fn print_profile(user: &UserProfile) {
    print_lines(&render_fields(&profile_fields(user), get_terminal_width(), use_color()));
}

pub fn print_status(snap: &SessionSnapshot) {
    let mut fields = vec![
        ("status".to_string(), format!("{:?}", snap.status()).to_lowercase()),
        ("access_token".to_string(), presence(snap.access_token.is_some())),
        ("refresh_token".to_string(), presence(snap.refresh_token.is_some())),
        ("initialized".to_string(), snap.initialized.to_string()),
    ];
    if let Some(err) = &snap.last_error {
        fields.push(("last_error".to_string(), err.clone()));
    }
    if let Some(user) = &snap.user {
        fields.extend(profile_fields(user));
    }
    print_lines(&render_fields(&fields, get_terminal_width(), use_color()));
}

pub fn print_two_factor(setup: &TwoFactorSetup) {
    let mut fields = vec![("secret".to_string(), setup.secret.clone())];
    for (i, code) in setup.backup_codes.iter().enumerate() {
        fields.push((format!("backup_code_{}", i + 1), code.clone()));
    }
    print_lines(&render_fields(&fields, get_terminal_width(), use_color()));
    // the QR payload is usually a long data URI; keep it out of the table
    println!("qr_code: {}", setup.qr_code);
}

fn print_lines(lines: &[String]) {
    for l in lines { println!("{}", l); }
}

fn use_color() -> bool {
    wants_color(std::io::stdout().is_terminal(), std::env::var_os("NO_COLOR").is_some())
}

// Color only for an interactive stdout, and never when NO_COLOR is set.
fn wants_color(is_tty: bool, no_color: bool) -> bool {
    is_tty && !no_color
}

fn presence(present: bool) -> String {
    if present { "stored".to_string() } else { "-".to_string() }
}

pub fn profile_fields(user: &UserProfile) -> Vec<(String, String)> {
    let ts = |t: &Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|v| v.format("%Y-%m-%d %H:%M:%S UTC").to_string()).unwrap_or_else(|| "-".to_string())
    };
    vec![
        ("id".to_string(), user.id.to_string()),
        ("email".to_string(), user.email.clone()),
        ("active".to_string(), user.is_active.to_string()),
        ("admin".to_string(), user.is_admin.to_string()),
        ("2fa".to_string(), user.is_2fa_enabled.to_string()),
        ("created_at".to_string(), ts(&user.created_at)),
        ("last_login".to_string(), ts(&user.last_login)),
    ]
}

/// Lay out `fields` as an ASCII table no wider than `termw` columns.
pub fn render_fields(fields: &[(String, String)], termw: usize, color_header: bool) -> Vec<String> {
    let cols = vec!["field".to_string(), "value".to_string()];
    let rows: Vec<Vec<String>> = fields.iter().map(|(k, v)| vec![k.clone(), v.clone()]).collect();

    let mut widths: Vec<usize> = cols.iter().map(|s| visible_len(s)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate() {
            widths[i] = widths[i].max(visible_len(cell));
        }
    }
    // give the value column whatever the key column and borders leave over
    let chrome = 7 + widths[0];
    if chrome + widths[1] > termw {
        widths[1] = termw.saturating_sub(chrome).max(1);
    }

    let sep = build_separator(&widths);
    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(sep.clone());
    out.push(if color_header { build_row_header_colored(&cols, &widths) } else { build_row(&cols, &widths) });
    out.push(sep.clone());
    for r in &rows {
        out.push(build_row(r, &widths));
    }
    out.push(sep);
    out
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('+');
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let (text, align_right) = (truncate(&cell, *w), is_numeric_like(&cell));
        s.push(' ');
        let pad = w.saturating_sub(visible_len(&text));
        if align_right {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push(' ');
        s.push('|');
    }
    s
}

// Header row with column names colored green. Padding follows visible width.
fn build_row_header_colored(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let text = truncate(&cell, *w);
        s.push(' ');
        s.push_str(&format!("\x1b[32m{}\x1b[0m", text));
        s.push_str(&" ".repeat(w.saturating_sub(visible_len(&text))));
        s.push(' ');
        s.push('|');
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    if st.is_empty() { return false; }
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+,_".contains(ch) { continue; }
        return false;
    }
    has_digit
}

fn get_terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) => (w as usize).saturating_sub(4).max(20),
        None => 80,
    }
}

fn visible_len(s: &str) -> usize {
    // visible chars, skipping ANSI CSI sequences
    let mut count = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() { break; }
                }
            }
            continue;
        }
        count += 1;
    }
    count
}
