use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::configuration::{Configuration, QuestionId};
use crate::codec::{CanonicalReader, CanonicalWriter, CodecError};

/// Structured result of one decrypted ballot.
///
/// Answers are grouped per question kind and keep the order in which the
/// records appeared in the plaintext.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub select_result_ids: Vec<QuestionId>,
    pub select_result: Vec<Vec<bool>>,
    pub rank_result_ids: Vec<QuestionId>,
    pub rank_result: Vec<Vec<u8>>,
    pub text_result_ids: Vec<QuestionId>,
    pub text_result: Vec<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum BallotError {
    #[error("ballot plaintext is not valid utf-8")]
    NotUtf8,
    #[error("malformed ballot record: {0}")]
    MalformedRecord(String),
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
    #[error("answer to question {id} has unexpected length: {got} != {expected}")]
    AnswerLength {
        id: String,
        got: usize,
        expected: usize,
    },
    #[error("question {id} admits at most {max} answers, got {got}")]
    TooManyAnswers { id: String, max: usize, got: usize },
    #[error("text answer to question {id} exceeds {max} bytes")]
    TextTooLong { id: String, max: usize },
}

impl Ballot {
    pub fn is_empty(&self) -> bool {
        self.select_result_ids.is_empty()
            && self.rank_result_ids.is_empty()
            && self.text_result_ids.is_empty()
    }

    /// Parse a plaintext ballot against the form configuration.
    ///
    /// The plaintext is a newline-delimited sequence of `kind:ID:payload`
    /// records terminated by an empty line; anything beyond the terminator is
    /// ignored. Any record violating the declared bounds fails the parse.
    pub fn unmarshal(plaintext: &[u8], configuration: &Configuration) -> Result<Self, BallotError> {
        let mut ballot = Ballot::default();

        for line in plaintext.split(|&byte| byte == b'\n') {
            if line.is_empty() {
                break;
            }
            let line = std::str::from_utf8(line).map_err(|_| BallotError::NotUtf8)?;

            let mut parts = line.splitn(3, ':');
            let (kind, id, payload) = match (parts.next(), parts.next(), parts.next()) {
                (Some(kind), Some(id), Some(payload)) => (kind, id, payload),
                _ => return Err(BallotError::MalformedRecord(line.to_string())),
            };

            match kind {
                "select" => {
                    let question = configuration
                        .find_select(id)
                        .ok_or_else(|| BallotError::UnknownQuestion(id.to_string()))?;
                    let answers = parse_select_payload(payload, line)?;
                    if answers.len() != question.choices.len() {
                        return Err(BallotError::AnswerLength {
                            id: id.to_string(),
                            got: answers.len(),
                            expected: question.choices.len(),
                        });
                    }
                    let picked = answers.iter().filter(|&&bit| bit).count();
                    if picked > question.max_n as usize {
                        return Err(BallotError::TooManyAnswers {
                            id: id.to_string(),
                            max: question.max_n as usize,
                            got: picked,
                        });
                    }
                    ballot.select_result_ids.push(id.to_string());
                    ballot.select_result.push(answers);
                }
                "rank" => {
                    let question = configuration
                        .find_rank(id)
                        .ok_or_else(|| BallotError::UnknownQuestion(id.to_string()))?;
                    let ranks = parse_rank_payload(payload, line)?;
                    if ranks.len() != question.choices.len() {
                        return Err(BallotError::AnswerLength {
                            id: id.to_string(),
                            got: ranks.len(),
                            expected: question.choices.len(),
                        });
                    }
                    ballot.rank_result_ids.push(id.to_string());
                    ballot.rank_result.push(ranks);
                }
                "text" => {
                    let question = configuration
                        .find_text(id)
                        .ok_or_else(|| BallotError::UnknownQuestion(id.to_string()))?;
                    let answers = parse_text_payload(payload, line)?;
                    if answers.len() > question.max_n as usize {
                        return Err(BallotError::TooManyAnswers {
                            id: id.to_string(),
                            max: question.max_n as usize,
                            got: answers.len(),
                        });
                    }
                    if answers
                        .iter()
                        .any(|answer| answer.len() > question.max_length as usize)
                    {
                        return Err(BallotError::TextTooLong {
                            id: id.to_string(),
                            max: question.max_length as usize,
                        });
                    }
                    ballot.text_result_ids.push(id.to_string());
                    ballot.text_result.push(answers);
                }
                other => {
                    return Err(BallotError::MalformedRecord(other.to_string()));
                }
            }
        }

        Ok(ballot)
    }

    pub fn write_canonical(&self, writer: &mut CanonicalWriter) {
        writer.append_u32(self.select_result_ids.len() as u32);
        for (id, answers) in self.select_result_ids.iter().zip(&self.select_result) {
            writer.append_str(id);
            writer.append_u32(answers.len() as u32);
            for &bit in answers {
                writer.append_u8(bit as u8);
            }
        }
        writer.append_u32(self.rank_result_ids.len() as u32);
        for (id, ranks) in self.rank_result_ids.iter().zip(&self.rank_result) {
            writer.append_str(id);
            writer.append_bytes(ranks);
        }
        writer.append_u32(self.text_result_ids.len() as u32);
        for (id, answers) in self.text_result_ids.iter().zip(&self.text_result) {
            writer.append_str(id);
            writer.append_u32(answers.len() as u32);
            for answer in answers {
                writer.append_str(answer);
            }
        }
    }

    pub fn read_canonical(reader: &mut CanonicalReader) -> Result<Self, CodecError> {
        let mut ballot = Ballot::default();

        let count = reader.read_len()?;
        for _ in 0..count {
            ballot.select_result_ids.push(reader.read_string()?);
            let answers = reader.read_len()?;
            let mut bits = Vec::with_capacity(answers);
            for _ in 0..answers {
                bits.push(reader.read_u8()? != 0);
            }
            ballot.select_result.push(bits);
        }

        let count = reader.read_len()?;
        for _ in 0..count {
            ballot.rank_result_ids.push(reader.read_string()?);
            ballot.rank_result.push(reader.read_bytes()?.to_vec());
        }

        let count = reader.read_len()?;
        for _ in 0..count {
            ballot.text_result_ids.push(reader.read_string()?);
            let answers = reader.read_len()?;
            let mut texts = Vec::with_capacity(answers);
            for _ in 0..answers {
                texts.push(reader.read_string()?);
            }
            ballot.text_result.push(texts);
        }

        Ok(ballot)
    }
}

fn parse_select_payload(payload: &str, line: &str) -> Result<Vec<bool>, BallotError> {
    payload
        .split(',')
        .map(|bit| match bit {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(BallotError::MalformedRecord(line.to_string())),
        })
        .collect()
}

fn parse_rank_payload(payload: &str, line: &str) -> Result<Vec<u8>, BallotError> {
    payload
        .split(',')
        .map(|rank| {
            rank.parse::<u8>()
                .map_err(|_| BallotError::MalformedRecord(line.to_string()))
        })
        .collect()
}

fn parse_text_payload(payload: &str, line: &str) -> Result<Vec<String>, BallotError> {
    payload
        .split(',')
        .map(|answer| {
            let bytes = BASE64
                .decode(answer)
                .map_err(|_| BallotError::MalformedRecord(line.to_string()))?;
            String::from_utf8(bytes).map_err(|_| BallotError::NotUtf8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::configuration::{Select, Subject, Text};

    fn encode_id(id: &str) -> String {
        BASE64.encode(id)
    }

    fn configuration() -> Configuration {
        Configuration {
            main_title: "dummyTitle".into(),
            scaffold: vec![Subject {
                id: encode_id("aa"),
                title: "subject1".into(),
                order: vec![encode_id("bb"), encode_id("ee")],
                subjects: Vec::new(),
                selects: vec![Select {
                    id: encode_id("bb"),
                    title: "snacks".into(),
                    max_n: 3,
                    min_n: 0,
                    choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                }],
                ranks: Vec::new(),
                texts: vec![Text {
                    id: encode_id("ee"),
                    title: "yes in your language".into(),
                    max_n: 1,
                    min_n: 0,
                    max_length: 3,
                    regex: String::new(),
                    choices: vec!["yes".into()],
                }],
            }],
        }
    }

    #[test]
    fn parses_select_and_text_records() {
        let plaintext = format!(
            "select:{}:0,0,1,0\ntext:{}:{}\n\n",
            encode_id("bb"),
            encode_id("ee"),
            BASE64.encode("yes"),
        );

        let ballot = Ballot::unmarshal(plaintext.as_bytes(), &configuration()).unwrap();
        assert_eq!(ballot.select_result_ids, vec![encode_id("bb")]);
        assert_eq!(ballot.select_result, vec![vec![false, false, true, false]]);
        assert_eq!(ballot.text_result_ids, vec![encode_id("ee")]);
        assert_eq!(ballot.text_result, vec![vec!["yes".to_string()]]);
        assert!(ballot.rank_result_ids.is_empty());
    }

    #[test]
    fn garbage_after_terminator_is_ignored() {
        let mut plaintext = format!("select:{}:1,0,0,0\n\n", encode_id("bb")).into_bytes();
        plaintext.extend_from_slice(&[0xFF, 0xFE, 0x00, 0x42]);

        let ballot = Ballot::unmarshal(&plaintext, &configuration()).unwrap();
        assert_eq!(ballot.select_result.len(), 1);
    }

    #[test]
    fn unknown_question_fails() {
        let plaintext = format!("select:{}:1,0,0,0\n\n", encode_id("zz"));
        let err = Ballot::unmarshal(plaintext.as_bytes(), &configuration()).unwrap_err();
        assert!(matches!(err, BallotError::UnknownQuestion(_)));
    }

    #[test]
    fn wrong_answer_length_fails() {
        let plaintext = format!("select:{}:1,0\n\n", encode_id("bb"));
        let err = Ballot::unmarshal(plaintext.as_bytes(), &configuration()).unwrap_err();
        assert!(matches!(err, BallotError::AnswerLength { .. }));
    }

    #[test]
    fn over_long_text_fails() {
        let plaintext = format!(
            "text:{}:{}\n\n",
            encode_id("ee"),
            BASE64.encode("too long for bounds"),
        );
        let err = Ballot::unmarshal(plaintext.as_bytes(), &configuration()).unwrap_err();
        assert!(matches!(err, BallotError::TextTooLong { .. }));
    }

    #[test]
    fn too_many_selections_fail() {
        let plaintext = format!("select:{}:1,1,1,1\n\n", encode_id("bb"));
        let err = Ballot::unmarshal(plaintext.as_bytes(), &configuration()).unwrap_err();
        assert!(matches!(err, BallotError::TooManyAnswers { .. }));
    }

    #[test]
    fn canonical_round_trip() {
        let plaintext = format!(
            "select:{}:0,1,1,0\ntext:{}:{}\n\n",
            encode_id("bb"),
            encode_id("ee"),
            BASE64.encode("ja"),
        );
        let ballot = Ballot::unmarshal(plaintext.as_bytes(), &configuration()).unwrap();

        let mut writer = CanonicalWriter::bare();
        ballot.write_canonical(&mut writer);
        let bytes = writer.finish();

        let mut reader = CanonicalReader::new(&bytes);
        let back = Ballot::read_canonical(&mut reader).unwrap();
        reader.finish().unwrap();
        assert_eq!(ballot, back);
    }
}
