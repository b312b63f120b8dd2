use std::fmt::Write as _;

use crate::form::PredictForm;

const GENDERS: [&str; 2] = ["male", "female"];
const GROUPS: [&str; 5] = ["group A", "group B", "group C", "group D", "group E"];
const EDUCATION: [&str; 6] = [
    "associate's degree",
    "bachelor's degree",
    "high school",
    "master's degree",
    "some college",
    "some high school",
];
const LUNCH: [&str; 2] = ["free/reduced", "standard"];
const PREPARATION: [&str; 2] = ["none", "completed"];

/// Escapes text for HTML bodies and attribute values.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        escape(title)
    )
}

/// Landing page.
#[must_use]
pub fn index_page() -> String {
    layout(
        "Student Exam Performance",
        "<h1>Student Exam Performance Indicator</h1>\n<p>Estimate a student's math score from their background and other test scores.</p>\n<p><a href=\"/predictdata\">Make a prediction</a></p>",
    )
}

fn select(out: &mut String, name: &str, label: &str, options: &[&str], selected: &str) {
    let _ = write!(
        out,
        "<label for=\"{name}\">{label}</label>\n<select id=\"{name}\" name=\"{name}\" required>\n<option value=\"\" disabled{}>Select {label}</option>\n",
        if selected.is_empty() { " selected" } else { "" }
    );
    for option in options {
        let escaped = escape(option);
        let marker = if *option == selected { " selected" } else { "" };
        let _ = writeln!(out, "<option value=\"{escaped}\"{marker}>{escaped}</option>");
    }
    out.push_str("</select>\n");
}

fn score_input(out: &mut String, name: &str, label: &str, value: &str) {
    let _ = writeln!(
        out,
        "<label for=\"{name}\">{label}</label>\n<input type=\"number\" id=\"{name}\" name=\"{name}\" min=\"0\" max=\"100\" step=\"any\" value=\"{}\">",
        escape(value)
    );
}

/// Prediction form, optionally pre-filled and carrying a result or an error.
#[must_use]
pub fn form_page(form: &PredictForm, result: Option<f64>, error: Option<&str>) -> String {
    let mut body = String::from("<h1>Student Exam Performance Prediction</h1>\n");
    if let Some(message) = error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", escape(message));
    }
    body.push_str("<form action=\"/predictdata\" method=\"post\">\n");
    select(&mut body, "gender", "Gender", &GENDERS, &form.gender);
    select(&mut body, "ethnicity", "Race or Ethnicity", &GROUPS, &form.ethnicity);
    select(
        &mut body,
        "parental_level_of_education",
        "Parental Level of Education",
        &EDUCATION,
        &form.parental_level_of_education,
    );
    select(&mut body, "lunch", "Lunch Type", &LUNCH, &form.lunch);
    select(
        &mut body,
        "test_preparation_course",
        "Test Preparation Course",
        &PREPARATION,
        &form.test_preparation_course,
    );
    score_input(&mut body, "reading_score", "Reading Score out of 100", &form.reading_score);
    score_input(&mut body, "writing_score", "Writing Score out of 100", &form.writing_score);
    body.push_str("<input type=\"submit\" value=\"Predict your Maths Score\">\n</form>\n");
    if let Some(value) = result {
        let _ = writeln!(body, "<h2>The prediction is {value:.2}</h2>");
    }
    layout("Student Exam Performance Prediction", &body)
}

/// Page shown when scoring fails on the server side.
#[must_use]
pub fn error_page(message: &str) -> String {
    layout(
        "Prediction unavailable",
        &format!(
            "<h1>Prediction unavailable</h1>\n<p>{}</p>\n<p><a href=\"/predictdata\">Back to the form</a></p>",
            escape(message)
        ),
    )
}
