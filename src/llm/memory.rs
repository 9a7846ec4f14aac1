use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    fn render(&self) -> String {
        format!("Human: {}\nAI: {}", self.question, self.answer)
    }
}

/// Keeps every exchange of the session and renders them as chat history.
#[derive(Debug, Clone)]
pub struct ConversationBufferMemory {
    input_key: String,
    memory_key: String,
    exchanges: Vec<Exchange>,
}

impl ConversationBufferMemory {
    pub fn new(input_key: &str, memory_key: &str) -> Self {
        Self {
            input_key: input_key.to_string(),
            memory_key: memory_key.to_string(),
            exchanges: Vec::new(),
        }
    }

    /// The prompt variable the user's input is bound to.
    pub fn input_key(&self) -> &str {
        &self.input_key
    }

    /// The prompt variable the rendered history is bound to.
    pub fn memory_key(&self) -> &str {
        &self.memory_key
    }

    pub fn save_context(&mut self, question: &str, answer: &str) {
        self.exchanges.push(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn load_history(&self) -> String {
        self.exchanges
            .iter()
            .map(Exchange::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// History with the oldest characters dropped until at most `budget`
    /// characters remain.
    pub fn truncated_history(&self, budget: usize) -> String {
        let history = self.load_history();
        let extra = history.chars().count().saturating_sub(budget);
        if extra == 0 {
            return history;
        }
        history.chars().skip(extra).collect()
    }
}
