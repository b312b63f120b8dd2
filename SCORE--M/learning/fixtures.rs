//! Synthetic student tables shared by unit tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::table::Table;

/// Column order of the source dataset.
pub const HEADERS: [&str; 8] = [
    "gender",
    "race_ethnicity",
    "parental_level_of_education",
    "lunch",
    "test_preparation_course",
    "math_score",
    "reading_score",
    "writing_score",
];

const GROUPS: [&str; 5] = ["group A", "group B", "group C", "group D", "group E"];
const EDUCATION: [&str; 6] = [
    "associate's degree",
    "bachelor's degree",
    "high school",
    "master's degree",
    "some college",
    "some high school",
];

/// Rows whose math score is a noisy linear function of the other columns.
pub fn student_table(rows: usize, seed: u64) -> Table {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut table = Table::new(HEADERS.iter().map(ToString::to_string).collect());
    for idx in 0..rows {
        let gender = if idx % 2 == 0 { "female" } else { "male" };
        let group = GROUPS[idx % GROUPS.len()];
        let education = EDUCATION[idx % EDUCATION.len()];
        let standard_lunch = idx % 3 != 0;
        let prepared = idx % 4 == 0;
        let reading: f64 = rng.gen_range(35.0..100.0_f64).round();
        let writing: f64 = (reading + rng.gen_range(-6.0..6.0_f64)).round();
        let math = 0.45 * reading + 0.4 * writing
            + if standard_lunch { 6.0 } else { 0.0 }
            + if prepared { 3.0 } else { 0.0 }
            + if gender == "male" { 4.0 } else { 0.0 }
            + rng.gen_range(-2.0..2.0_f64);
        let row = vec![
            gender.to_string(),
            group.to_string(),
            education.to_string(),
            if standard_lunch { "standard" } else { "free/reduced" }.to_string(),
            if prepared { "completed" } else { "none" }.to_string(),
            format!("{}", math.round()),
            format!("{reading}"),
            format!("{writing}"),
        ];
        table.push_row(row).unwrap();
    }
    table
}
