//! Composite entities built from field descriptors
//!
//! Instead of writing `read`/`write`/`reset` by hand, an entity can be put
//! together from fields, each carrying its own three behaviours:
//!
//! - `BinarySaveCollection`: an ordered list of binary members. Order is the
//!   wire format, so appending a field at the end is the only compatible
//!   change.
//! - `TextSaveCollection`: members keyed by name. Order only affects how the
//!   file looks; a name missing from the file resets that field, and names the
//!   collection doesn't know are ignored.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;

use super::saveable::{
    BinarySave, ByteReader, ByteWriter, LineWriter, Save, TextSave, decode_binary, decode_text,
    encode_binary, encode_text, parse_text_fields,
};
use super::types::SaveError;

type BinaryRead = Box<dyn FnMut(&mut ByteReader<'_>) -> Result<(), SaveError>>;
type BinaryWrite = Box<dyn Fn(&mut ByteWriter) -> Result<(), SaveError>>;
type TextRead = Box<dyn FnMut(&str) -> Result<(), SaveError>>;
type TextWrite = Box<dyn Fn() -> String>;
type ResetFn = Box<dyn FnMut()>;

/// A single binary field: read, write and reset behaviour
pub struct BinaryField {
    read: BinaryRead,
    write: BinaryWrite,
    reset: ResetFn,
}

impl BinaryField {
    pub fn new(
        read: impl FnMut(&mut ByteReader<'_>) -> Result<(), SaveError> + 'static,
        write: impl Fn(&mut ByteWriter) -> Result<(), SaveError> + 'static,
        reset: impl FnMut() + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            write: Box::new(write),
            reset: Box::new(reset),
        }
    }
}

impl BinarySave for BinaryField {
    fn reset(&mut self) {
        (self.reset)();
    }

    fn read(&mut self, reader: &mut ByteReader<'_>) -> Result<(), SaveError> {
        (self.read)(reader)
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<(), SaveError> {
        (self.write)(writer)
    }
}

/// A member of a `TextSaveCollection`: one value, stored under one name
pub trait TextSavable {
    fn reset(&mut self);
    fn read(&mut self, value: &str) -> Result<(), SaveError>;
    fn write(&self) -> String;
}

/// A single text field: read, write and reset behaviour
pub struct TextField {
    read: TextRead,
    write: TextWrite,
    reset: ResetFn,
}

impl TextField {
    pub fn new(
        read: impl FnMut(&str) -> Result<(), SaveError> + 'static,
        write: impl Fn() -> String + 'static,
        reset: impl FnMut() + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            write: Box::new(write),
            reset: Box::new(reset),
        }
    }

    /// Field over a shared value that parses with `FromStr` and resets to `default`.
    pub fn parsed<T>(value: Rc<RefCell<T>>, default: T) -> Self
    where
        T: FromStr + Display + Clone + 'static,
    {
        let read_cell = Rc::clone(&value);
        let write_cell = Rc::clone(&value);
        let reset_cell = value;
        Self::new(
            move |text| {
                let parsed = text
                    .parse::<T>()
                    .map_err(|_| SaveError::Corrupted(format!("unparsable value {:?}", text)))?;
                *read_cell.borrow_mut() = parsed;
                Ok(())
            },
            move || write_cell.borrow().to_string(),
            move || *reset_cell.borrow_mut() = default.clone(),
        )
    }
}

impl TextSavable for TextField {
    fn reset(&mut self) {
        (self.reset)();
    }

    fn read(&mut self, value: &str) -> Result<(), SaveError> {
        (self.read)(value)
    }

    fn write(&self) -> String {
        (self.write)()
    }
}

/// Ordered list of binary members, read and written in list order
#[derive(Default)]
pub struct BinarySaveCollection {
    members: Vec<Box<dyn BinarySave>>,
}

impl BinarySaveCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: impl IntoIterator<Item = BinaryField>) -> Self {
        let mut collection = Self::new();
        for field in fields {
            collection.push(field);
        }
        collection
    }

    pub fn push(&mut self, member: impl BinarySave + 'static) {
        self.members.push(Box::new(member));
    }

    pub fn with(mut self, member: impl BinarySave + 'static) -> Self {
        self.push(member);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl BinarySave for BinarySaveCollection {
    fn reset(&mut self) {
        for member in &mut self.members {
            member.reset();
        }
    }

    fn read(&mut self, reader: &mut ByteReader<'_>) -> Result<(), SaveError> {
        for member in &mut self.members {
            member.read(reader)?;
        }
        Ok(())
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<(), SaveError> {
        for member in &self.members {
            member.write(writer)?;
        }
        Ok(())
    }
}

impl Save for BinarySaveCollection {
    fn reset(&mut self) {
        BinarySave::reset(self);
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SaveError> {
        encode_binary(self)
    }

    fn from_bytes(&mut self, data: &[u8]) -> Result<(), SaveError> {
        decode_binary(self, data)
    }
}

/// Named text members, written in insertion order
#[derive(Default)]
pub struct TextSaveCollection {
    members: Vec<(String, Box<dyn TextSavable>)>,
}

impl TextSaveCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member. A second member with the same name replaces the first.
    pub fn insert(&mut self, name: impl Into<String>, member: impl TextSavable + 'static) {
        let name = name.into();
        let member: Box<dyn TextSavable> = Box::new(member);
        match self.members.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = member,
            None => self.members.push((name, member)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, member: impl TextSavable + 'static) -> Self {
        self.insert(name, member);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl TextSave for TextSaveCollection {
    fn reset(&mut self) {
        for (_, member) in &mut self.members {
            member.reset();
        }
    }

    fn read(&mut self, text: &str) -> Result<(), SaveError> {
        // Later duplicates win
        let values: HashMap<&str, &str> = parse_text_fields(text)?.into_iter().collect();

        for (name, member) in &mut self.members {
            match values.get(name.as_str()) {
                Some(value) => member.read(value)?,
                None => member.reset(),
            }
        }
        Ok(())
    }

    fn write(&self, writer: &mut LineWriter) -> Result<(), SaveError> {
        for (name, member) in &self.members {
            writer.write_field(name, member.write());
        }
        Ok(())
    }
}

impl Save for TextSaveCollection {
    fn reset(&mut self) {
        TextSave::reset(self);
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SaveError> {
        encode_text(self)
    }

    fn from_bytes(&mut self, data: &[u8]) -> Result<(), SaveError> {
        decode_text(self, data)
    }
}
