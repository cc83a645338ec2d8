//! Compiler configuration.

/// Where the allocator/collector boilerplate lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeapMode {
    /// Runtime states emitted into the program text itself.
    #[default]
    Inline,
    /// Runtime states emitted as a separate header; the program carries a
    /// `linked` reference and the VM loader folds the header in.
    Linked,
}

/// An embedder-supplied library fragment, spliced verbatim into the output
/// between the runtime and the user states. Fragments whose text was never
/// attached fail compilation up front.
#[derive(Debug, Clone)]
pub struct LibraryFragment {
    pub name: String,
    pub text: Option<String>,
}

impl LibraryFragment {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
        }
    }

    /// A fragment promised by name only. Compilation refuses to proceed
    /// until text is attached; a missing fragment in the output would
    /// fail at VM load time with a much worse message.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Interleave source-position comments with the emitted code.
    pub inline_comments: bool,
    /// Value stack slots; globals live at the bottom as frame zero.
    pub stack_size: u32,
    /// Initial heap size in 16-slot pages. The allocator grows past this
    /// on demand.
    pub heap_pages: u32,
    pub heap: HeapMode,
    pub fragments: Vec<LibraryFragment>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            inline_comments: false,
            stack_size: 1024,
            heap_pages: 64,
            heap: HeapMode::Inline,
            fragments: Vec::new(),
        }
    }
}

impl CompileOptions {
    pub fn with_comments(mut self) -> Self {
        self.inline_comments = true;
        self
    }

    pub fn stack_size(mut self, slots: u32) -> Self {
        self.stack_size = slots;
        self
    }

    pub fn heap_pages(mut self, pages: u32) -> Self {
        self.heap_pages = pages;
        self
    }

    pub fn linked_heap(mut self) -> Self {
        self.heap = HeapMode::Linked;
        self
    }

    pub fn fragment(mut self, fragment: LibraryFragment) -> Self {
        self.fragments.push(fragment);
        self
    }
}
