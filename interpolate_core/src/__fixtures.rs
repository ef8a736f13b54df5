use std::collections::HashMap;

use serde_json::Value;
use serde_json::json;

/// A configuration document with chained references, nested keys and an
/// expression.
pub fn config_document() -> Value {
	json!({
		"key": "Terminator",
		"baseKey": "${key}",
		"ENV_VALUE": "DEV",
		"envKey": "${ENV_VALUE}",
		"MATH_KEY": 18,
		"mathKey": "${MATH_KEY}",
		"subKey": {
			"baseKey": "${baseKey}",
			"envKey": "subEnv_${ENV_VALUE}",
			"deepSubKey": {
				"envKey": "deep_${envKey}"
			},
			"mathKeyEven": "${= MATH_KEY % 2 == 0 =}"
		},
		"complex": "I have both ${key} & ${ENV_VALUE} & ${subKey.envKey} & ${= ${subKey.deepSubKey.envKey} + ${subKey.envKey} =} & ${DOES_NOT_EXIST}"
	})
}

/// [`config_document`] written with `{{ }}` delimiters and a `::` pointer.
pub fn custom_config_document() -> Value {
	json!({
		"key": "Terminator",
		"baseKey": "{{key}}",
		"ENV_VALUE": "DEV",
		"envKey": "{{ENV_VALUE}}",
		"MATH_KEY": 18,
		"mathKey": "{{MATH_KEY}}",
		"subKey": {
			"baseKey": "{{baseKey}}",
			"envKey": "subEnv_{{ENV_VALUE}}",
			"deepSubKey": {
				"envKey": "deep_{{envKey}}"
			},
			"mathKeyEven": "{{= {{MATH_KEY}} % 2 == 0 =}}"
		},
		"complex": "I have both {{key}} & {{ENV_VALUE}} & {{subKey::envKey}} & {{= {{subKey::deepSubKey::envKey}} + {{subKey::envKey}} =}} & {{DOES_NOT_EXIST}}"
	})
}

/// [`custom_config_document`] carrying its own delimiters as option leaves.
pub fn self_configured_document() -> Value {
	let mut document = custom_config_document();

	if let Value::Object(map) = &mut document {
		map.insert("INTERPOLATE_OPTION_PREFIX".into(), json!("{{"));
		map.insert("INTERPOLATE_OPTION_SUFFIX".into(), json!("}}"));
		map.insert("INTERPOLATE_OPTION_SUBKEYPOINTER".into(), json!("::"));
	}

	document
}

pub fn person() -> Value {
	json!({ "name": "David", "age": 18 })
}

pub fn overrides() -> Value {
	json!({ "ENV_VALUE": "ENV_VALUE", "MATH_KEY": -334.67 })
}

/// An environment with no `INTERPOLATE_OPTION_*` variables.
pub fn empty_environment() -> HashMap<String, String> {
	HashMap::new()
}

pub fn environment(entries: &[(&str, &str)]) -> HashMap<String, String> {
	entries
		.iter()
		.map(|(key, value)| ((*key).to_string(), (*value).to_string()))
		.collect()
}
