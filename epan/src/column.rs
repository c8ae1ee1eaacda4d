//! Summary columns filled in by dissectors as a packet is decoded.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Protocol,
    Info,
    Source,
    Destination,
}

impl Column {
    const ALL: [Column; 4] = [
        Column::Protocol,
        Column::Info,
        Column::Source,
        Column::Destination,
    ];

    fn index(self) -> usize {
        match self {
            Column::Protocol => 0,
            Column::Info => 1,
            Column::Source => 2,
            Column::Destination => 3,
        }
    }
}

/// Column texts of one packet. Each column may carry a fence: text before the fence was written
/// by an outer layer and survives `set` and `clear` calls from inner layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    text: [String; 4],
    fence: [usize; 4],
}

impl Columns {
    pub fn get(&self, col: Column) -> &str {
        &self.text[col.index()]
    }

    pub fn set(&mut self, col: Column, text: &str) {
        let i = col.index();
        self.text[i].truncate(self.fence[i]);
        self.text[i].push_str(text);
    }

    pub fn append(&mut self, col: Column, text: &str) {
        self.text[col.index()].push_str(text);
    }

    /// Appends `text`, preceded by `sep` unless the unfenced part of the column is empty.
    pub fn append_sep(&mut self, col: Column, sep: &str, text: &str) {
        let i = col.index();
        if self.text[i].len() > self.fence[i] {
            self.text[i].push_str(sep);
        }
        self.text[i].push_str(text);
    }

    pub fn clear(&mut self, col: Column) {
        let i = col.index();
        self.text[i].truncate(self.fence[i]);
    }

    /// Protects the current text of the column from later `set` and `clear` calls.
    pub fn set_fence(&mut self, col: Column) {
        let i = col.index();
        self.fence[i] = self.text[i].len();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &str)> {
        Column::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}
