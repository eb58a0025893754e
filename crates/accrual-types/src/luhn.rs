//! Luhn checksum for order numbers.

/// Returns true when `number` is a non-empty string of ASCII digits whose
/// Luhn checksum is valid.
pub fn is_valid_order_number(number: &str) -> bool {
	if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
		return false;
	}

	let sum: u32 = number
		.bytes()
		.rev()
		.enumerate()
		.map(|(i, b)| {
			let digit = u32::from(b - b'0');
			if i % 2 == 1 {
				let doubled = digit * 2;
				if doubled > 9 {
					doubled - 9
				} else {
					doubled
				}
			} else {
				digit
			}
		})
		.sum();

	sum % 10 == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_valid_numbers() {
		assert!(is_valid_order_number("79927398713"));
		assert!(is_valid_order_number("12345678903"));
		assert!(is_valid_order_number("0"));
	}

	#[test]
	fn test_invalid_numbers() {
		assert!(!is_valid_order_number("79927398710"));
		assert!(!is_valid_order_number(""));
		assert!(!is_valid_order_number("7992739871a"));
		assert!(!is_valid_order_number(" 79927398713"));
	}
}
