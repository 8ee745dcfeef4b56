// File: src/builtins.rs
//
// Plain-Rust helpers backing the Myco native functions.
// Math helpers, random numbers, and range construction live here; the
// native-function dispatch layer wraps them with argument handling.

use crate::interpreter::Value;
use rand::Rng;

/// Math functions

pub fn abs(x: f64) -> f64 {
    x.abs()
}

pub fn sqrt(x: f64) -> f64 {
    x.sqrt()
}

pub fn pow(base: f64, exp: f64) -> f64 {
    base.powf(exp)
}

pub fn floor(x: f64) -> f64 {
    x.floor()
}

pub fn ceil(x: f64) -> f64 {
    x.ceil()
}

pub fn round(x: f64) -> f64 {
    x.round()
}

pub fn sin(x: f64) -> f64 {
    x.sin()
}

pub fn cos(x: f64) -> f64 {
    x.cos()
}

pub fn tan(x: f64) -> f64 {
    x.tan()
}

pub fn min(a: f64, b: f64) -> f64 {
    a.min(b)
}

pub fn max(a: f64, b: f64) -> f64 {
    a.max(b)
}

/// Random number functions

/// Generate a random float between 0.0 and 1.0
pub fn random() -> f64 {
    let mut rng = rand::thread_rng();
    rng.gen::<f64>()
}

/// Generate a random integer between min and max (inclusive)
pub fn random_int(min: f64, max: f64) -> f64 {
    let mut rng = rand::thread_rng();
    let (lo, hi) = if min <= max { (min as i64, max as i64) } else { (max as i64, min as i64) };
    rng.gen_range(lo..=hi) as f64
}

/// Range construction for the `range` builtin:
/// range(end), range(start, end), range(start, end, step)
pub fn make_range(args: &[f64]) -> Option<Value> {
    match args {
        [end] => Some(Value::Range { start: 0.0, end: *end, step: 1.0, inclusive: false }),
        [start, end] => Some(Value::Range { start: *start, end: *end, step: 1.0, inclusive: false }),
        [start, end, step] if *step != 0.0 => {
            Some(Value::Range { start: *start, end: *end, step: *step, inclusive: false })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_in_unit_interval() {
        for _ in 0..100 {
            let r = random();
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn test_random_int_inclusive_bounds() {
        for _ in 0..100 {
            let r = random_int(1.0, 3.0);
            assert!((1.0..=3.0).contains(&r));
        }
    }

    #[test]
    fn test_make_range_arities() {
        match make_range(&[5.0]) {
            Some(Value::Range { start, end, step, inclusive }) => {
                assert_eq!((start, end, step, inclusive), (0.0, 5.0, 1.0, false));
            }
            other => panic!("Expected range, got {:?}", other),
        }
        match make_range(&[2.0, 10.0, 2.0]) {
            Some(Value::Range { start, end, step, .. }) => {
                assert_eq!((start, end, step), (2.0, 10.0, 2.0));
            }
            other => panic!("Expected range, got {:?}", other),
        }
        assert!(make_range(&[1.0, 2.0, 0.0]).is_none(), "zero step is rejected");
        assert!(make_range(&[]).is_none());
    }
}
