//! Built-in quizzes used when no model is configured. They keep the full
//! request path exercisable offline: generation draws from this bank, and
//! everything downstream (reveal, answers, evaluation) behaves identically.

use rand::seq::SliceRandom;

use crate::domain::{Difficulty, GenerationRequest, Question, Quiz};

pub struct SeedEntry {
  pub difficulty: Difficulty,
  /// Lowercase keyword matched against the requested topic.
  pub keyword: &'static str,
  pub quiz: Quiz,
}

fn q(id: &str, question: &str, options: &[&str], correct_answer: usize, explanation: &str) -> Question {
  Question {
    id: id.to_string(),
    question: question.to_string(),
    options: options.iter().map(|o| o.to_string()).collect(),
    correct_answer,
    explanation: explanation.to_string(),
  }
}

/// The three-question JavaScript quiz. Tests lean on its stable ids and
/// answer keys, so changes here ripple into the whole test suite.
pub fn fixture_quiz() -> Quiz {
  Quiz {
    title: "JavaScript 基础测试".to_string(),
    description: "涵盖变量、类型与数组方法的 JavaScript 基础测验。".to_string(),
    questions: vec![
      q(
        "js-1",
        "以下哪个关键字用于声明块级作用域变量？",
        &["var", "let", "function", "with"],
        1,
        "let 声明的变量具有块级作用域，var 则是函数作用域。",
      ),
      q(
        "js-2",
        "typeof null 的结果是什么？",
        &["\"object\"", "\"null\"", "\"undefined\""],
        0,
        "这是 JavaScript 的历史遗留行为，typeof null 返回 \"object\"。",
      ),
      q(
        "js-3",
        "下列哪个方法会返回新数组而不修改原数组？",
        &["push", "sort", "map", "splice"],
        2,
        "map 基于回调结果返回新数组，原数组保持不变。",
      ),
    ],
    total_questions: 3,
    estimated_time: "5 分钟".to_string(),
  }
}

pub fn seed_bank() -> Vec<SeedEntry> {
  vec![
    SeedEntry { difficulty: Difficulty::Medium, keyword: "javascript", quiz: fixture_quiz() },
    SeedEntry {
      difficulty: Difficulty::Easy,
      keyword: "web",
      quiz: Quiz {
        title: "Web 开发入门".to_string(),
        description: "面向初学者的网页开发基础测验。".to_string(),
        questions: vec![
          q(
            "web-1",
            "HTML 中用于创建超链接的标签是哪一个？",
            &["<a>", "<p>", "<div>", "<span>"],
            0,
            "<a> 标签配合 href 属性用于创建超链接。",
          ),
          q(
            "web-2",
            "CSS 的主要职责是什么？",
            &["定义网页结构", "控制网页样式", "处理服务器逻辑"],
            1,
            "CSS 负责页面的布局与外观，结构由 HTML 承担。",
          ),
          q(
            "web-3",
            "HTTP 状态码 404 表示什么？",
            &["请求成功", "服务器内部错误", "资源未找到", "重定向"],
            2,
            "404 表示服务器找不到请求的资源。",
          ),
        ],
        total_questions: 3,
        estimated_time: "4 分钟".to_string(),
      },
    },
    SeedEntry {
      difficulty: Difficulty::Medium,
      keyword: "react",
      quiz: Quiz {
        title: "React 入门".to_string(),
        description: "React 核心概念的入门测验。".to_string(),
        questions: vec![
          q(
            "react-1",
            "React 组件的状态应通过什么更新？",
            &["直接赋值", "setState 或状态更新函数", "修改 props"],
            1,
            "状态必须通过更新函数修改，直接赋值不会触发重新渲染。",
          ),
          q(
            "react-2",
            "useEffect 的第二个参数是什么？",
            &["回调函数", "依赖数组", "初始状态", "引用对象"],
            1,
            "依赖数组决定副作用在哪些值变化时重新执行。",
          ),
          q(
            "react-3",
            "JSX 中嵌入表达式使用什么符号？",
            &["圆括号", "双引号", "花括号"],
            2,
            "JSX 使用花括号 {} 嵌入任意 JavaScript 表达式。",
          ),
        ],
        total_questions: 3,
        estimated_time: "5 分钟".to_string(),
      },
    },
    SeedEntry {
      difficulty: Difficulty::Hard,
      keyword: "javascript",
      quiz: Quiz {
        title: "JavaScript 异步编程".to_string(),
        description: "事件循环与 Promise 的进阶测验。".to_string(),
        questions: vec![
          q(
            "async-1",
            "Promise.all 在其中一个输入被拒绝时会怎样？",
            &["等待所有完成后再拒绝", "立即以第一个拒绝原因拒绝", "返回部分结果", "永远挂起"],
            1,
            "Promise.all 采用快速失败策略，任一拒绝立即拒绝整体。",
          ),
          q(
            "async-2",
            "微任务与宏任务的执行顺序是？",
            &["宏任务总是先于微任务", "每个宏任务之后清空微任务队列", "两者交替随机执行"],
            1,
            "事件循环在每个宏任务结束后清空整个微任务队列。",
          ),
          q(
            "async-3",
            "async 函数的返回值是什么？",
            &["原始返回值", "undefined", "Promise", "生成器"],
            2,
            "async 函数总是返回 Promise，返回值会被包装。",
          ),
        ],
        total_questions: 3,
        estimated_time: "6 分钟".to_string(),
      },
    },
  ]
}

/// Pick a seed for the request: same difficulty first, topic keyword match
/// preferred, then trim to the requested question count.
pub fn seed_quiz(req: &GenerationRequest) -> Quiz {
  let mut bank = seed_bank();
  let topic = req.topic.to_lowercase();

  let mut candidates: Vec<usize> = bank
    .iter()
    .enumerate()
    .filter(|(_, e)| e.difficulty == req.difficulty)
    .map(|(i, _)| i)
    .collect();
  if candidates.is_empty() {
    candidates = (0..bank.len()).collect();
  }
  let matching: Vec<usize> = candidates
    .iter()
    .copied()
    .filter(|&i| topic.contains(bank[i].keyword))
    .collect();
  let pool = if matching.is_empty() { candidates } else { matching };

  let mut rng = rand::thread_rng();
  let pick = pool.choose(&mut rng).copied().unwrap_or(0);
  let mut quiz = bank.swap_remove(pick).quiz;

  let want = (req.number_of_questions as usize).min(quiz.questions.len()).max(1);
  quiz.questions.truncate(want);
  quiz.total_questions = quiz.questions.len() as u32;
  quiz
}
