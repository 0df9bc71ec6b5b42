use std::fmt::{Display, Formatter};

/// Default cap on the length of a sampled image binding array within one descriptor set instance.
pub const DEFAULT_MAX_TEXTURES_PER_SET: u32 = 16;

/// Options captured by a [`System`](crate::system::System) on construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SystemOptions {
	/// Emit layout and binding diagnostics through `log` at info level.
	pub debug: bool,
	/// Sampled image arrays longer than this are split across descriptor set instances.
	pub max_textures_per_set: u32,
}

impl Default for SystemOptions {
	fn default() -> Self {
		Self {
			debug: false,
			max_textures_per_set: DEFAULT_MAX_TEXTURES_PER_SET,
		}
	}
}

impl SystemOptions {
	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn max_textures_per_set(mut self, max_textures_per_set: u32) -> Self {
		self.max_textures_per_set = max_textures_per_set.max(1);
		self
	}
}

/// Environment variables consulted for a device override, later entries lose against earlier ones.
pub const DEVICE_SELECT_VARS: [&str; 2] = ["MESA_VK_DEVICE_SELECT", "VK_DEVICE_SELECT"];

/// Overrides [`DEVICE_SELECT_VARS`] for compute-only devices.
pub const COMPUTE_DEVICE_SELECT_VAR: &str = "VK_COMPUTE_DEVICE_SELECT";

/// A user override of physical device selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceSelect {
	/// The n-th discrete device.
	Index(usize),
	/// The first device whose name contains this string.
	Name(String),
}

impl DeviceSelect {
	pub fn parse(value: &str) -> Option<Self> {
		let value = value.trim();
		if value.is_empty() {
			None
		} else if let Ok(index) = value.parse::<usize>() {
			Some(DeviceSelect::Index(index))
		} else {
			Some(DeviceSelect::Name(value.to_string()))
		}
	}
}

impl Display for DeviceSelect {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			DeviceSelect::Index(index) => write!(f, "discrete device #{index}"),
			DeviceSelect::Name(name) => write!(f, "device named {name:?}"),
		}
	}
}

/// Options for device bring-up.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GpuOptions {
	/// Enables the validation layer and verbose device selection logging.
	pub debug: bool,
	/// Open a compute-only device.
	pub compute: bool,
	pub device_select: Option<DeviceSelect>,
}

impl GpuOptions {
	/// Reads the device override from the process environment.
	pub fn from_env(compute: bool) -> Self {
		Self::from_lookup(compute, |key| std::env::var(key).ok())
	}

	pub fn from_lookup(compute: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
		let mut device_select = DEVICE_SELECT_VARS
			.iter()
			.find_map(|key| lookup(key).as_deref().and_then(DeviceSelect::parse));
		if compute {
			if let Some(select) = lookup(COMPUTE_DEVICE_SELECT_VAR).as_deref().and_then(DeviceSelect::parse) {
				device_select = Some(select);
			}
		}
		Self {
			debug: false,
			compute,
			device_select,
		}
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}
}

/// What device selection needs to know about a physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
	pub name: String,
	pub discrete: bool,
	pub largest_heap: u64,
}

/// Picks a device index from `candidates`.
///
/// A [`DeviceSelect::Index`] counts discrete devices only and is an error if no such device exists. A
/// [`DeviceSelect::Name`] that matches nothing falls back to the default policy: the discrete device with the largest
/// memory heap, or the first device if there are no discrete ones.
pub fn select_device(candidates: &[DeviceCandidate], select: Option<&DeviceSelect>) -> Option<usize> {
	if candidates.len() <= 1 {
		return if candidates.is_empty() { None } else { Some(0) };
	}

	match select {
		Some(DeviceSelect::Index(index)) => {
			return candidates
				.iter()
				.enumerate()
				.filter(|(_, c)| c.discrete)
				.nth(*index)
				.map(|(i, _)| i);
		}
		Some(DeviceSelect::Name(name)) => {
			if let Some(i) = candidates.iter().position(|c| c.name.contains(name.as_str())) {
				return Some(i);
			}
			log::warn!("no device named {name:?}, falling back to default device selection");
		}
		None => (),
	}

	let best_discrete = candidates
		.iter()
		.enumerate()
		.filter(|(_, c)| c.discrete)
		.max_by(|(ai, a), (bi, b)| a.largest_heap.cmp(&b.largest_heap).then(bi.cmp(ai)))
		.map(|(i, _)| i);
	Some(best_discrete.unwrap_or(0))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn candidates() -> Vec<DeviceCandidate> {
		vec![
			DeviceCandidate {
				name: "llvmpipe".into(),
				discrete: false,
				largest_heap: 64 << 30,
			},
			DeviceCandidate {
				name: "Radeon RX 7600".into(),
				discrete: true,
				largest_heap: 8 << 30,
			},
			DeviceCandidate {
				name: "GeForce RTX 4090".into(),
				discrete: true,
				largest_heap: 24 << 30,
			},
		]
	}

	#[test]
	fn default_prefers_largest_discrete() {
		assert_eq!(select_device(&candidates(), None), Some(2));
	}

	#[test]
	fn index_counts_discrete_devices() {
		assert_eq!(select_device(&candidates(), Some(&DeviceSelect::Index(0))), Some(1));
		assert_eq!(select_device(&candidates(), Some(&DeviceSelect::Index(1))), Some(2));
		assert_eq!(select_device(&candidates(), Some(&DeviceSelect::Index(2))), None);
	}

	#[test]
	fn name_matches_substring_or_falls_back() {
		let select = DeviceSelect::Name("Radeon".into());
		assert_eq!(select_device(&candidates(), Some(&select)), Some(1));
		let select = DeviceSelect::Name("Arc".into());
		assert_eq!(select_device(&candidates(), Some(&select)), Some(2));
	}

	#[test]
	fn single_device_always_wins() {
		let single = vec![candidates().remove(0)];
		assert_eq!(select_device(&single, Some(&DeviceSelect::Index(3))), Some(0));
		assert_eq!(select_device(&[], None), None);
	}

	#[test]
	fn compute_override_beats_generic_override() {
		let env = |key: &str| match key {
			"VK_DEVICE_SELECT" => Some("1".to_string()),
			"VK_COMPUTE_DEVICE_SELECT" => Some("GeForce".to_string()),
			_ => None,
		};
		assert_eq!(GpuOptions::from_lookup(false, env).device_select, Some(DeviceSelect::Index(1)));
		assert_eq!(
			GpuOptions::from_lookup(true, env).device_select,
			Some(DeviceSelect::Name("GeForce".into()))
		);
	}

	#[test]
	fn mesa_override_takes_precedence() {
		let env = |key: &str| match key {
			"MESA_VK_DEVICE_SELECT" => Some("0".to_string()),
			"VK_DEVICE_SELECT" => Some("1".to_string()),
			_ => None,
		};
		assert_eq!(GpuOptions::from_lookup(false, env).device_select, Some(DeviceSelect::Index(0)));
	}
}
