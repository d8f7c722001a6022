//! Compact loadout codes.
//!
//! A code is 31 fixed-width ids, each four upper-case base-36 digits, in
//! slot order: character, melee, ranged, 8 character mods, 8 melee mods,
//! 8 ranged mods, 4 resonance mods. Empty slots are `0000`.

use crate::build::{Build, BuildOptions, ModSpec};
use crate::data::{GameData, ModCategory};
use crate::error::BuildError;
use std::fmt;
use std::sync::Arc;

const WIDTH: usize = 4;
const RADIX: u32 = 36;
/// Largest id that fits in four base-36 digits.
pub const MAX_ID: u32 = 36 * 36 * 36 * 36 - 1;
const SLOTS: usize = 3 + 8 + 8 + 8 + 4;

/// Ids of one loadout; `0` marks an empty slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadoutCode {
    pub character: u32,
    pub melee: u32,
    pub ranged: u32,
    pub mods: [Vec<u32>; 4],
}

fn encode_id(id: u32) -> Result<String, BuildError> {
    if id > MAX_ID {
        return Err(BuildError::InvalidCode(format!(
            "id {} does not fit in {} base-36 digits",
            id, WIDTH
        )));
    }
    let mut digits = [b'0'; WIDTH];
    let mut rest = id;
    for slot in digits.iter_mut().rev() {
        let digit = rest % RADIX;
        rest /= RADIX;
        *slot = char::from_digit(digit, RADIX)
            .map(|c| c.to_ascii_uppercase() as u8)
            .unwrap_or(b'0');
    }
    Ok(digits.iter().map(|&b| b as char).collect())
}

fn decode_id(chunk: &str, position: usize) -> Result<u32, BuildError> {
    if !chunk
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        return Err(BuildError::InvalidCode(format!(
            "invalid characters \"{}\" at slot {}",
            chunk, position
        )));
    }
    u32::from_str_radix(chunk, RADIX).map_err(|e| {
        BuildError::InvalidCode(format!("slot {}: {}", position, e))
    })
}

impl LoadoutCode {
    /// Capture the ids of a build.
    pub fn from_build(build: &Build) -> Self {
        let mut mods: [Vec<u32>; 4] = Default::default();
        for category in ModCategory::ALL {
            mods[category.index()] = build.mods(category).iter().map(|m| m.id()).collect();
        }
        Self {
            character: build.character().record().id,
            melee: build.melee().record().id,
            ranged: build.ranged().record().id,
            mods,
        }
    }

    /// Render as a 124-character code.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use buildscore::code::LoadoutCode;
    ///
    /// let mut code = LoadoutCode { character: 1, melee: 36, ranged: 1295, ..Default::default() };
    /// code.mods[0] = vec![35];
    /// let text = code.encode().unwrap();
    /// assert!(text.starts_with("0001001000ZZ000Z"));
    /// assert_eq!(LoadoutCode::decode(&text).unwrap(), code);
    /// ```
    pub fn encode(&self) -> Result<String, BuildError> {
        let mut out = String::with_capacity(SLOTS * WIDTH);
        for id in [self.character, self.melee, self.ranged] {
            out.push_str(&encode_id(id)?);
        }
        for category in ModCategory::ALL {
            let ids = &self.mods[category.index()];
            if ids.len() > category.cap() {
                return Err(BuildError::InvalidCode(format!(
                    "{} mods exceed {} slots",
                    category,
                    category.cap()
                )));
            }
            for slot in 0..category.cap() {
                out.push_str(&encode_id(ids.get(slot).copied().unwrap_or(0))?);
            }
        }
        Ok(out)
    }

    /// Parse a code; surrounding whitespace is ignored.
    pub fn decode(code: &str) -> Result<Self, BuildError> {
        let code = code.trim();
        if !code.is_ascii() || code.len() != SLOTS * WIDTH {
            return Err(BuildError::InvalidCode(format!(
                "expected {} characters, got {}",
                SLOTS * WIDTH,
                code.chars().count()
            )));
        }
        let ids = (0..SLOTS)
            .map(|i| decode_id(&code[i * WIDTH..(i + 1) * WIDTH], i))
            .collect::<Result<Vec<u32>, BuildError>>()?;

        let mut mods: [Vec<u32>; 4] = Default::default();
        let mut offset = 3;
        for category in ModCategory::ALL {
            mods[category.index()] = ids[offset..offset + category.cap()]
                .iter()
                .copied()
                .filter(|id| *id != 0)
                .collect();
            offset += category.cap();
        }
        Ok(Self {
            character: ids[0],
            melee: ids[1],
            ranged: ids[2],
            mods,
        })
    }

    /// Slot lists for a new build; names are looked up in `data`.
    pub fn to_options(&self, data: &GameData) -> Result<BuildOptions, BuildError> {
        let mut options = BuildOptions {
            character: data.character_by_id(self.character)?.name.clone(),
            melee: data.weapon_by_id(self.melee)?.name.clone(),
            ranged: data.weapon_by_id(self.ranged)?.name.clone(),
            ..Default::default()
        };
        for category in ModCategory::ALL {
            *options.mods.get_mut(category) = self.mods[category.index()]
                .iter()
                .map(|&id| ModSpec::new(id))
                .collect();
        }
        Ok(options)
    }
}

impl std::str::FromStr for LoadoutCode {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Build {
    /// Loadout code of this build's character, weapons and mods.
    pub fn to_code(&self) -> Result<String, BuildError> {
        LoadoutCode::from_build(self).encode()
    }

    /// Build from a loadout code with default levels and max-rank mods.
    pub fn from_code(data: Arc<GameData>, code: &str) -> Result<Self, BuildError> {
        let options = LoadoutCode::decode(code)?.to_options(&data)?;
        Build::new(data, options)
    }
}

impl fmt::Display for LoadoutCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(code) => f.write_str(&code),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_id_width() {
        assert_eq!(encode_id(0).unwrap(), "0000");
        assert_eq!(encode_id(35).unwrap(), "000Z");
        assert_eq!(encode_id(MAX_ID).unwrap(), "ZZZZ");
        assert!(matches!(encode_id(MAX_ID + 1), Err(BuildError::InvalidCode(_))));
    }

    #[test]
    fn test_decode_rejects_length() {
        assert!(matches!(
            LoadoutCode::decode("0001"),
            Err(BuildError::InvalidCode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_lowercase() {
        let mut code = LoadoutCode::default().encode().unwrap();
        code.replace_range(0..4, "00ab");
        assert!(matches!(
            LoadoutCode::decode(&code),
            Err(BuildError::InvalidCode(_))
        ));
    }

    #[test]
    fn test_empty_slots_dropped() {
        let mut code = LoadoutCode {
            character: 7,
            melee: 8,
            ranged: 9,
            ..Default::default()
        };
        code.mods[ModCategory::Resonance.index()] = vec![100, 200];
        let text = code.encode().unwrap();
        assert_eq!(text.len(), 124);
        let back = LoadoutCode::decode(&text).unwrap();
        assert_eq!(back.mods[ModCategory::Resonance.index()], vec![100, 200]);
        assert!(back.mods[ModCategory::Character.index()].is_empty());
    }

    #[test]
    fn test_too_many_mods() {
        let mut code = LoadoutCode::default();
        code.mods[ModCategory::Resonance.index()] = vec![1; 5];
        assert!(code.encode().is_err());
    }
}
