//! Standard pitch names and their rounded frequencies.

/// Note name to frequency in Hz, B0 through DS8. Sharps use an `S`
/// after the letter (`CS4` is C#4).
pub const NOTES: [(&str, f64); 89] = [
    ("B0", 31.0), ("C1", 33.0), ("CS1", 35.0), ("D1", 37.0),
    ("DS1", 39.0), ("E1", 41.0), ("F1", 44.0), ("FS1", 46.0),
    ("G1", 49.0), ("GS1", 52.0), ("A1", 55.0), ("AS1", 58.0),
    ("B1", 62.0), ("C2", 65.0), ("CS2", 69.0), ("D2", 73.0),
    ("DS2", 78.0), ("E2", 82.0), ("F2", 87.0), ("FS2", 93.0),
    ("G2", 98.0), ("GS2", 104.0), ("A2", 110.0), ("AS2", 117.0),
    ("B2", 123.0), ("C3", 131.0), ("CS3", 139.0), ("D3", 147.0),
    ("DS3", 156.0), ("E3", 165.0), ("F3", 175.0), ("FS3", 185.0),
    ("G3", 196.0), ("GS3", 208.0), ("A3", 220.0), ("AS3", 233.0),
    ("B3", 247.0), ("C4", 262.0), ("CS4", 277.0), ("D4", 294.0),
    ("DS4", 311.0), ("E4", 330.0), ("F4", 349.0), ("FS4", 370.0),
    ("G4", 392.0), ("GS4", 415.0), ("A4", 440.0), ("AS4", 466.0),
    ("B4", 494.0), ("C5", 523.0), ("CS5", 554.0), ("D5", 587.0),
    ("DS5", 622.0), ("E5", 659.0), ("F5", 698.0), ("FS5", 740.0),
    ("G5", 784.0), ("GS5", 831.0), ("A5", 880.0), ("AS5", 932.0),
    ("B5", 988.0), ("C6", 1047.0), ("CS6", 1109.0), ("D6", 1175.0),
    ("DS6", 1245.0), ("E6", 1319.0), ("F6", 1397.0), ("FS6", 1480.0),
    ("G6", 1568.0), ("GS6", 1661.0), ("A6", 1760.0), ("AS6", 1865.0),
    ("B6", 1976.0), ("C7", 2093.0), ("CS7", 2217.0), ("D7", 2349.0),
    ("DS7", 2489.0), ("E7", 2637.0), ("F7", 2794.0), ("FS7", 2960.0),
    ("G7", 3136.0), ("GS7", 3322.0), ("A7", 3520.0), ("AS7", 3729.0),
    ("B7", 3951.0), ("C8", 4186.0), ("CS8", 4435.0), ("D8", 4699.0),
    ("DS8", 4978.0),
];

/// Looks up a note name. Case-insensitive; accepts an optional `NOTE_`
/// prefix and `#` for sharps.
pub fn frequency(name: &str) -> Option<f64> {
    let upper = name.to_ascii_uppercase().replace('#', "S");
    let key = upper.strip_prefix("NOTE_").unwrap_or(upper.as_str());
    NOTES.iter().find(|(n, _)| *n == key).map(|&(_, hz)| hz)
}
