use serde::{Deserialize, Serialize};

use crate::codec::{CanonicalReader, CanonicalWriter, CodecError};

/// Base64 identifier of a question or subject.
pub type QuestionId = String;

fn base64_len(bytes: usize) -> usize {
    (bytes + 2) / 3 * 4
}

/// Typed questionnaire of a form. The configuration fixes the plaintext
/// ballot grammar and therefore the ballot size and chunk count.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub main_title: String,
    pub scaffold: Vec<Subject>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: QuestionId,
    pub title: String,
    /// Display order of nested elements, by id.
    pub order: Vec<QuestionId>,
    pub subjects: Vec<Subject>,
    pub selects: Vec<Select>,
    pub ranks: Vec<Rank>,
    pub texts: Vec<Text>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Select {
    pub id: QuestionId,
    pub title: String,
    pub max_n: u32,
    pub min_n: u32,
    pub choices: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub id: QuestionId,
    pub title: String,
    pub max_n: u32,
    pub min_n: u32,
    pub choices: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub id: QuestionId,
    pub title: String,
    pub max_n: u32,
    pub min_n: u32,
    pub max_length: u32,
    pub regex: String,
    pub choices: Vec<String>,
}

impl Select {
    /// `select:<id>:0,1,0\n` takes one digit plus separator per choice.
    fn max_encoded_size(&self) -> usize {
        "select:".len() + self.id.len() + 1 + 2 * self.choices.len()
    }
}

impl Rank {
    /// `rank:<id>:0,12,3\n` with ranks printing in at most three digits.
    fn max_encoded_size(&self) -> usize {
        "rank:".len() + self.id.len() + 1 + 4 * self.choices.len()
    }
}

impl Text {
    /// `text:<id>:<base64>,<base64>\n` carries up to `max_n` answers of
    /// `max_length` bytes each, base64 encoded.
    fn max_encoded_size(&self) -> usize {
        "text:".len()
            + self.id.len()
            + 1
            + self.max_n as usize * (base64_len(self.max_length as usize) + 1)
    }
}

impl Subject {
    fn max_encoded_size(&self) -> usize {
        let own: usize = self
            .selects
            .iter()
            .map(Select::max_encoded_size)
            .chain(self.ranks.iter().map(Rank::max_encoded_size))
            .chain(self.texts.iter().map(Text::max_encoded_size))
            .sum();
        let nested: usize = self.subjects.iter().map(Subject::max_encoded_size).sum();
        own + nested
    }

    fn find_select(&self, id: &str) -> Option<&Select> {
        self.selects
            .iter()
            .find(|question| question.id == id)
            .or_else(|| self.subjects.iter().find_map(|s| s.find_select(id)))
    }

    fn find_rank(&self, id: &str) -> Option<&Rank> {
        self.ranks
            .iter()
            .find(|question| question.id == id)
            .or_else(|| self.subjects.iter().find_map(|s| s.find_rank(id)))
    }

    fn find_text(&self, id: &str) -> Option<&Text> {
        self.texts
            .iter()
            .find(|question| question.id == id)
            .or_else(|| self.subjects.iter().find_map(|s| s.find_text(id)))
    }
}

impl Configuration {
    /// Upper bound on the plaintext encoding of any ballot answering this
    /// questionnaire, including the terminating empty line.
    pub fn max_ballot_size(&self) -> usize {
        let questions: usize = self.scaffold.iter().map(Subject::max_encoded_size).sum();
        if questions == 0 {
            return 0;
        }
        questions + 1
    }

    pub fn find_select(&self, id: &str) -> Option<&Select> {
        self.scaffold.iter().find_map(|s| s.find_select(id))
    }

    pub fn find_rank(&self, id: &str) -> Option<&Rank> {
        self.scaffold.iter().find_map(|s| s.find_rank(id))
    }

    pub fn find_text(&self, id: &str) -> Option<&Text> {
        self.scaffold.iter().find_map(|s| s.find_text(id))
    }

    pub fn write_canonical(&self, writer: &mut CanonicalWriter) {
        writer.append_str(&self.main_title);
        writer.append_u32(self.scaffold.len() as u32);
        for subject in &self.scaffold {
            subject.write_canonical(writer);
        }
    }

    pub fn read_canonical(reader: &mut CanonicalReader) -> Result<Self, CodecError> {
        let main_title = reader.read_string()?;
        let count = reader.read_len()?;
        let mut scaffold = Vec::with_capacity(count);
        for _ in 0..count {
            scaffold.push(Subject::read_canonical(reader)?);
        }
        Ok(Self {
            main_title,
            scaffold,
        })
    }
}

fn write_string_list(writer: &mut CanonicalWriter, values: &[String]) {
    writer.append_u32(values.len() as u32);
    for value in values {
        writer.append_str(value);
    }
}

fn read_string_list(reader: &mut CanonicalReader) -> Result<Vec<String>, CodecError> {
    let count = reader.read_len()?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.read_string()?);
    }
    Ok(values)
}

impl Subject {
    fn write_canonical(&self, writer: &mut CanonicalWriter) {
        writer.append_str(&self.id);
        writer.append_str(&self.title);
        write_string_list(writer, &self.order);
        writer.append_u32(self.subjects.len() as u32);
        for subject in &self.subjects {
            subject.write_canonical(writer);
        }
        writer.append_u32(self.selects.len() as u32);
        for select in &self.selects {
            writer.append_str(&select.id);
            writer.append_str(&select.title);
            writer.append_u32(select.max_n);
            writer.append_u32(select.min_n);
            write_string_list(writer, &select.choices);
        }
        writer.append_u32(self.ranks.len() as u32);
        for rank in &self.ranks {
            writer.append_str(&rank.id);
            writer.append_str(&rank.title);
            writer.append_u32(rank.max_n);
            writer.append_u32(rank.min_n);
            write_string_list(writer, &rank.choices);
        }
        writer.append_u32(self.texts.len() as u32);
        for text in &self.texts {
            writer.append_str(&text.id);
            writer.append_str(&text.title);
            writer.append_u32(text.max_n);
            writer.append_u32(text.min_n);
            writer.append_u32(text.max_length);
            writer.append_str(&text.regex);
            write_string_list(writer, &text.choices);
        }
    }

    fn read_canonical(reader: &mut CanonicalReader) -> Result<Self, CodecError> {
        let id = reader.read_string()?;
        let title = reader.read_string()?;
        let order = read_string_list(reader)?;

        let count = reader.read_len()?;
        let mut subjects = Vec::with_capacity(count);
        for _ in 0..count {
            subjects.push(Subject::read_canonical(reader)?);
        }

        let count = reader.read_len()?;
        let mut selects = Vec::with_capacity(count);
        for _ in 0..count {
            selects.push(Select {
                id: reader.read_string()?,
                title: reader.read_string()?,
                max_n: reader.read_u32()?,
                min_n: reader.read_u32()?,
                choices: read_string_list(reader)?,
            });
        }

        let count = reader.read_len()?;
        let mut ranks = Vec::with_capacity(count);
        for _ in 0..count {
            ranks.push(Rank {
                id: reader.read_string()?,
                title: reader.read_string()?,
                max_n: reader.read_u32()?,
                min_n: reader.read_u32()?,
                choices: read_string_list(reader)?,
            });
        }

        let count = reader.read_len()?;
        let mut texts = Vec::with_capacity(count);
        for _ in 0..count {
            texts.push(Text {
                id: reader.read_string()?,
                title: reader.read_string()?,
                max_n: reader.read_u32()?,
                min_n: reader.read_u32()?,
                max_length: reader.read_u32()?,
                regex: reader.read_string()?,
                choices: read_string_list(reader)?,
            });
        }

        Ok(Self {
            id,
            title,
            order,
            subjects,
            selects,
            ranks,
            texts,
        })
    }
}
