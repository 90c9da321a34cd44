pub type RemovalCombo = Vec<RemovalLiteral>;
pub type RemovalComboSet = Vec<RemovalCombo>;

/// AND-identity: the set containing the empty combo, i.e. "removable
/// unconditionally".
fn combo_set_always() -> RemovalComboSet {
    vec![Vec::new()]
}

/// AND-zero: the empty set, i.e. "can never be fully removed".
fn combo_set_never() -> RemovalComboSet {
    Vec::new()
}

fn literal(expr_index: usize, when: bool) -> RemovalLiteral {
    RemovalLiteral { expr_index, when }
}

/// Sorts and de-duplicates one conjunction; a contradictory assignment for
/// the same expression index cancels the whole combo.
fn normalize_combo(mut combo: RemovalCombo) -> Option<RemovalCombo> {
    combo.sort();
    combo.dedup();
    for pair in combo.windows(2) {
        if pair[0].expr_index == pair[1].expr_index && pair[0].when != pair[1].when {
            return None;
        }
    }
    Some(combo)
}

fn normalize_combo_set(mut set: RemovalComboSet) -> RemovalComboSet {
    set.sort();
    set.dedup();
    set
}

/// Cross product with per-combo contradiction pruning.
pub fn combos_and(a: &RemovalComboSet, b: &RemovalComboSet) -> RemovalComboSet {
    let mut result = Vec::new();
    for left in a {
        for right in b {
            let mut merged = left.clone();
            merged.extend(right.iter().copied());
            if let Some(combo) = normalize_combo(merged) {
                result.push(combo);
            }
        }
    }
    normalize_combo_set(result)
}

/// Set union with de-duplication.
pub fn combos_or(a: &RemovalComboSet, b: &RemovalComboSet) -> RemovalComboSet {
    let mut result = a.clone();
    result.extend(b.iter().cloned());
    normalize_combo_set(result)
}

#[derive(Debug, Clone)]
struct RemovalBranch {
    guard: Option<usize>,
    body: RemovalComboSet,
}

#[derive(Debug, Clone)]
struct RemovalFrame {
    branches: Vec<RemovalBranch>,
}

/// Computes, over arbitrarily nested if/elseif/else blocks inside a WHERE
/// clause, every combination of branch outcomes under which the clause
/// contributes zero predicates.
///
/// Never errors: shapes it cannot analyze degrade toward `Exists` (not
/// removable), favoring safety.
#[derive(Debug)]
pub struct WhereAnalyzer {
    frames: Vec<RemovalFrame>,
    top: RemovalComboSet,
    loop_depth: usize,
}

impl WhereAnalyzer {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            top: combo_set_always(),
            loop_depth: 0,
        }
    }

    fn current_accumulator(&mut self) -> &mut RemovalComboSet {
        // Every frame is created with at least one branch.
        let use_branch = self
            .frames
            .last()
            .is_some_and(|frame| !frame.branches.is_empty());
        if use_branch {
            let frame = self.frames.len() - 1;
            let branch = self.frames[frame].branches.len() - 1;
            &mut self.frames[frame].branches[branch].body
        } else {
            &mut self.top
        }
    }

    /// ANDs a component into the current branch (or top level). `None` means
    /// "this content always contributes a predicate".
    fn add_component(&mut self, component: Option<RemovalComboSet>) {
        let component = component.unwrap_or_else(combo_set_never);
        let accumulator = self.current_accumulator();
        *accumulator = combos_and(accumulator, &component);
    }

    /// Any statically-emitted non-whitespace text guarantees output.
    pub fn on_static(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.add_component(None);
        }
    }

    /// An evaluated expression always produces output.
    pub fn on_eval(&mut self) {
        self.add_component(None);
    }

    /// Conditional structure opened inside a loop body is opaque to the
    /// analysis; only the loop's emitted content counts. The matching
    /// `on_end` is skipped under the same guard.
    pub fn on_if(&mut self, expr_index: usize) {
        if self.loop_depth > 0 {
            return;
        }
        self.frames.push(RemovalFrame {
            branches: vec![RemovalBranch {
                guard: Some(expr_index),
                body: combo_set_always(),
            }],
        });
    }

    pub fn on_elseif(&mut self, expr_index: usize) {
        if self.loop_depth > 0 {
            return;
        }
        match self.frames.last_mut() {
            Some(frame) => frame.branches.push(RemovalBranch {
                guard: Some(expr_index),
                body: combo_set_always(),
            }),
            None => self.add_component(None),
        }
    }

    pub fn on_else(&mut self) {
        if self.loop_depth > 0 {
            return;
        }
        match self.frames.last_mut() {
            Some(frame) => frame.branches.push(RemovalBranch {
                guard: None,
                body: combo_set_always(),
            }),
            None => self.add_component(None),
        }
    }

    pub fn on_end(&mut self) {
        if self.loop_depth > 0 {
            return;
        }
        self.exit_conditional();
    }

    pub fn on_loop_start(&mut self) {
        self.loop_depth += 1;
    }

    pub fn on_loop_end(&mut self) {
        self.loop_depth = self.loop_depth.saturating_sub(1);
    }

    /// Union over each branch of "all preceding guards false AND own guard
    /// true AND body removable", plus the all-guards-false fallthrough when
    /// no `else` branch exists.
    fn exit_conditional(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };

        let mut block = combo_set_never();
        let mut preceding_false = combo_set_always();
        let mut has_else = false;

        for branch in &frame.branches {
            let mut term = preceding_false.clone();
            match branch.guard {
                Some(guard) => {
                    term = combos_and(&term, &vec![vec![literal(guard, true)]]);
                    preceding_false =
                        combos_and(&preceding_false, &vec![vec![literal(guard, false)]]);
                }
                None => has_else = true,
            }
            term = combos_and(&term, &branch.body);
            block = combos_or(&block, &term);
        }

        if !has_else {
            block = combos_or(&block, &preceding_false);
        }

        self.add_component(Some(block));
    }

    /// Unwinds any still-open frames and classifies the clause.
    pub fn finalize(mut self) -> (WhereStatus, RemovalComboSet) {
        while !self.frames.is_empty() {
            self.exit_conditional();
        }

        let combos = self.top;
        if combos.iter().any(|combo| combo.is_empty()) {
            (WhereStatus::Fullscan, Vec::new())
        } else if combos.is_empty() {
            (WhereStatus::Exists, Vec::new())
        } else {
            (WhereStatus::Conditional, combos)
        }
    }
}

impl Default for WhereAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
