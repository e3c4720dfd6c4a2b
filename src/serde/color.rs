use ::serde::{ser::SerializeSeq, Deserialize};

use crate::color::LedColor;

pub fn serialize_color_as_array<S: ::serde::ser::Serializer>(
    color: &LedColor,
    s: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = s.serialize_seq(Some(3))?;
    seq.serialize_element(&color.red)?;
    seq.serialize_element(&color.green)?;
    seq.serialize_element(&color.blue)?;
    seq.end()
}

pub fn deserialize_color_from_array<'de, D: ::serde::de::Deserializer<'de>>(
    d: D,
) -> Result<LedColor, D::Error> {
    let [red, green, blue] = <[u8; 3]>::deserialize(d)?;
    Ok(LedColor::new(red, green, blue))
}
