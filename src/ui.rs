use crate::models::{GroupKey, User};
use crate::queries::{
    active_visits, current_visit_for_user, display_name, group_by_city, group_by_organization,
    initials, suggestions_for_visit, visits_for_user,
};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::fmt::Write;

pub fn render_index(store: &Store, group: GroupKey) -> String {
    INDEX_HTML
        .replace("{{SESSION}}", &render_session(store))
        .replace("{{MY_VISITS}}", &render_my_visits(store))
        .replace("{{DIRECTORY}}", &render_directory(store, group))
        .replace("{{VISITS}}", &render_visits(store))
}

fn render_session(store: &Store) -> String {
    let Some(user) = store.current_user() else {
        return profile_form(None);
    };

    let in_town = current_visit_for_user(store.visits(), &user.id).is_some();
    let (badge, action) = if in_town {
        ("<span class=\"badge\">Currently in town!</span>", "Mark as left town")
    } else {
        ("", "I'm in town now")
    };

    let mut details = String::new();
    for part in [user.occupation.as_deref(), user.city.as_deref()].into_iter().flatten() {
        let _ = write!(details, " <span class=\"muted\">{}</span>", escape(part));
    }
    if let Some(joined) = user.joined_at {
        let _ = write!(details, " <span class=\"muted\">Joined {}</span>", day(joined));
    }

    format!(
        r#"<div class="session">
      <span class="avatar">{initials}</span>
      <div><strong>{name}</strong>{details} {badge}</div>
      <form method="post" action="/in-town"><button class="btn-primary">{action}</button></form>
      <form method="post" action="/logout"><button class="btn-quiet">Log out</button></form>
      <form method="post" action="/leave"><button class="btn-quiet">Leave directory</button></form>
    </div>
    <details class="edit">
      <summary>Edit profile</summary>
      {form}
    </details>"#,
        initials = escape(&initials(&user.name)),
        name = escape(&user.name),
        form = profile_form(Some(user)),
    )
}

/// Registration form, prefilled with `user` when editing an existing profile.
fn profile_form(user: Option<&User>) -> String {
    let value = |field: Option<&str>| escape(field.unwrap_or_default());
    let organizations = user.map(|user| user.organizations.join(", "));
    let (submit, cancel) = match user {
        Some(_) => ("Update profile", r#" <a class="btn-quiet" href="/">Cancel</a>"#),
        None => ("Create account", ""),
    };

    format!(
        r#"<form class="register" method="post" action="/register">
      <input name="name" placeholder="Your name" value="{name}" required />
      <input name="organizations" placeholder="Organizations, comma separated" value="{organizations}" />
      <input name="city" placeholder="City (optional)" value="{city}" />
      <input name="occupation" placeholder="Occupation (optional)" value="{occupation}" />
      <input name="bio" placeholder="Bio (optional)" value="{bio}" />
      <button class="btn-primary">{submit}</button>{cancel}
    </form>"#,
        name = value(user.map(|user| user.name.as_str())),
        organizations = value(organizations.as_deref()),
        city = value(user.and_then(|user| user.city.as_deref())),
        occupation = value(user.and_then(|user| user.occupation.as_deref())),
        bio = value(user.and_then(|user| user.bio.as_deref())),
    )
}

fn render_my_visits(store: &Store) -> String {
    let Some(user) = store.current_user() else {
        return String::new();
    };

    let mut html = String::from("<section class=\"visit\"><h2>Your visits</h2>");
    let visits = visits_for_user(store.visits(), &user.id);
    if visits.is_empty() {
        html.push_str("<p class=\"empty\">No visits yet.</p>");
    } else {
        html.push_str("<ul>");
        for visit in visits {
            let _ = write!(html, "<li>{} from {}", visit.status.as_str(), day(visit.start_date));
            if let Some(end) = visit.end_date {
                let _ = write!(html, " to {}", day(end));
            }
            if let Some(notes) = &visit.notes {
                let _ = write!(html, " <span class=\"muted\">{}</span>", escape(notes));
            }
            html.push_str("</li>");
        }
        html.push_str("</ul>");
    }

    html.push_str(PLAN_VISIT_FORM);
    html.push_str("</section>");
    html
}

fn render_directory(store: &Store, group: GroupKey) -> String {
    let (groups, empty) = match group {
        GroupKey::Organization => (
            group_by_organization(store.users()),
            "No one has joined an organization yet.",
        ),
        GroupKey::City => (group_by_city(store.users()), "No one is registered in a city yet."),
    };

    let mut html = String::from(
        "<nav class=\"muted\">Group by <a href=\"/?by=organization\">organization</a> | <a href=\"/?by=city\">city</a></nav>",
    );
    if groups.is_empty() {
        let _ = write!(html, "<p class=\"empty\">{empty}</p>");
        return html;
    }

    let current_id = store.current_user().map(|user| user.id.as_str());
    for (key, users) in groups {
        let _ = write!(
            html,
            "<section class=\"group\"><h3>{} <small>{}</small></h3><ul>",
            escape(key),
            people(users.len())
        );
        for user in users {
            let _ = write!(html, "<li>{}", escape(&user.name));
            if current_id == Some(user.id.as_str()) {
                html.push_str(" <small>(You)</small>");
            }
            for part in [user.occupation.as_deref(), user.bio.as_deref()].into_iter().flatten() {
                let _ = write!(html, " <span class=\"muted\">{}</span>", escape(part));
            }
            if let Some(joined) = user.joined_at {
                let _ = write!(html, " <small>Joined {}</small>", day(joined));
            }
            html.push_str("</li>");
        }
        html.push_str("</ul></section>");
    }
    html
}

fn render_visits(store: &Store) -> String {
    let visits = active_visits(store.visits());
    if visits.is_empty() {
        return "<p class=\"empty\">No active visits to suggest activities for.</p>".to_string();
    }

    let signed_in = store.current_user().is_some();
    let mut html = String::new();
    for visit in visits {
        let owner = display_name(store.users(), &visit.user_id).unwrap_or("Someone");
        let _ = write!(
            html,
            "<section class=\"visit\"><h3>{} <small>{} from {}</small></h3>",
            escape(owner),
            visit.status.as_str(),
            day(visit.start_date)
        );
        if let Some(notes) = &visit.notes {
            let _ = write!(html, "<p class=\"muted\">{}</p>", escape(notes));
        }

        let suggestions = suggestions_for_visit(store.suggestions(), &visit.id);
        if suggestions.is_empty() {
            html.push_str("<p class=\"empty\">No activity suggestions yet</p>");
        } else {
            html.push_str("<ul>");
            for suggestion in suggestions {
                let author = display_name(store.users(), &suggestion.user_id).unwrap_or("Someone");
                let _ = write!(
                    html,
                    "<li><strong>{}</strong> {}",
                    escape(&suggestion.title),
                    escape(&suggestion.description)
                );
                if let Some(date) = suggestion.suggested_date {
                    let _ = write!(html, " <span class=\"muted\">Suggested for: {}</span>", day(date));
                }
                let _ = write!(html, " <span class=\"muted\">suggested by {}</span></li>", escape(author));
            }
            html.push_str("</ul>");
        }

        if signed_in {
            let _ = write!(
                html,
                r#"<form class="register" method="post" action="/suggestions">
      <input type="hidden" name="visit_id" value="{visit_id}" />
      <input name="title" placeholder="Activity title" required />
      <input name="description" placeholder="Description" required />
      <input type="date" name="suggested_date" />
      <button class="btn-primary">Suggest activity</button>
    </form>"#,
                visit_id = escape(&visit.id),
            );
        }
        html.push_str("</section>");
    }
    html
}

fn day(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn people(count: usize) -> String {
    if count == 1 {
        "1 person".to_string()
    } else {
        format!("{count} people")
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

const PLAN_VISIT_FORM: &str = r#"<form class="register" method="post" action="/visits">
      <label>Start <input type="date" name="start_date" required /></label>
      <label>End <input type="date" name="end_date" /></label>
      <input name="notes" placeholder="Notes (optional)" />
      <button class="btn-primary">Plan visit</button>
    </form>"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Visit Board</title>
  <style>
    :root {
      --bg-1: #f8f3e6;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: var(--bg-1);
      color: var(--ink);
      font-family: "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(860px, 100%);
      background: var(--card);
      border-radius: 28px;
      padding: 36px;
      display: grid;
      gap: 28px;
    }

    .session, .register {
      display: flex;
      flex-wrap: wrap;
      align-items: center;
      gap: 12px;
    }

    .avatar {
      width: 40px;
      height: 40px;
      border-radius: 50%;
      display: inline-grid;
      place-items: center;
      background: var(--accent-2);
      color: white;
      font-weight: 600;
    }

    .badge {
      background: var(--accent);
      color: white;
      border-radius: 999px;
      padding: 2px 10px;
      font-size: 0.85rem;
    }

    button, a.btn-quiet {
      border: none;
      border-radius: 999px;
      padding: 10px 18px;
      font-weight: 600;
      cursor: pointer;
      text-decoration: none;
    }

    .btn-primary {
      background: var(--accent);
      color: white;
    }

    .btn-quiet {
      background: rgba(47, 72, 88, 0.08);
      color: var(--accent-2);
    }

    .group, .visit {
      background: white;
      border-radius: 18px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
    }

    .muted, small, .empty {
      color: #8b857d;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Visit Board</h1>
    </header>
    {{SESSION}}
    {{MY_VISITS}}
    <h2>Directory</h2>
    {{DIRECTORY}}
    <h2>Active visits</h2>
    {{VISITS}}
  </main>
</body>
</html>
"#;
