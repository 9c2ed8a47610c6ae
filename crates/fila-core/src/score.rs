//! Priority score of a retirement case.
//!
//! | condition          | points |
//! |--------------------|--------|
//! | age ≥ 60           | +1     |
//! | age ≥ 80           | +2     |
//! | invalidity         | +2     |

use chrono::{Datelike, NaiveDate, Utc};

/// Whole years between `birth` and `today`. The year difference is reduced by
/// one while the birthday of the current year has not been reached.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
  let mut age = today.year() - birth.year();
  if (today.month(), today.day()) < (birth.month(), birth.day()) {
    age -= 1;
  }
  age
}

pub fn score_on(birth: NaiveDate, invalidity: bool, today: NaiveDate) -> i32 {
  let age = age_on(birth, today);
  let mut score = 0;
  if age >= 60 {
    score += 1;
  }
  if age >= 80 {
    score += 2;
  }
  if invalidity {
    score += 2;
  }
  score
}

/// [`score_on`] evaluated against the current UTC date.
pub fn score(birth: NaiveDate, invalidity: bool) -> i32 {
  score_on(birth, invalidity, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
  use chrono::Months;

  use super::*;

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 6, 15).unwrap() }

  fn years_ago(n: u32) -> NaiveDate {
    today().checked_sub_months(Months::new(12 * n)).unwrap()
  }

  #[test]
  fn score_table() {
    let cases = [
      (30, false, 0),
      (30, true, 2),
      (59, false, 0),
      (60, false, 1),
      (60, true, 3),
      (70, true, 3),
      (79, false, 1),
      (80, false, 3),
      (80, true, 5),
      (85, true, 5),
    ];
    for (age, invalidity, expected) in cases {
      assert_eq!(
        score_on(years_ago(age), invalidity, today()),
        expected,
        "age {age}, invalidity {invalidity}"
      );
    }
  }

  #[test]
  fn birthday_not_yet_reached_counts_previous_year() {
    let birth = NaiveDate::from_ymd_opt(1965, 6, 16).unwrap();
    assert_eq!(age_on(birth, today()), 59);
    assert_eq!(score_on(birth, false, today()), 0);
  }

  #[test]
  fn birthday_today_counts() {
    let birth = NaiveDate::from_ymd_opt(1965, 6, 15).unwrap();
    assert_eq!(age_on(birth, today()), 60);
    assert_eq!(score_on(birth, false, today()), 1);
  }

  #[test]
  fn leap_day_birthday() {
    let birth = NaiveDate::from_ymd_opt(1964, 2, 29).unwrap();
    let feb_28 = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
    let mar_1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    assert_eq!(age_on(birth, feb_28), 60);
    assert_eq!(age_on(birth, mar_1), 61);
  }

  #[test]
  fn score_is_pure() {
    let birth = years_ago(70);
    assert_eq!(
      score_on(birth, true, today()),
      score_on(birth, true, today())
    );
  }
}
